// ABOUTME: Run-scoped pipeline state: current state, history, step metrics, artifacts.
// ABOUTME: One context per publish; never shared between runs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::build::BuildOutput;
use crate::contract::{ContractPaths, GeneratedContract, Site};
use crate::diagnostics::Diagnostics;
use crate::types::{DeploymentId, ReleaseHash};

use super::checks::WarmReport;
use super::error::{PipelineError, PipelineErrorKind};
use super::manifest::ArtifactManifest;
use super::package::PackagedFile;
use super::request::PublishRequest;
use super::state::{PipelineState, Step};
use super::upload::UploadReport;

/// One entry of the append-only state log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateHistoryEntry {
    pub state: PipelineState,
    pub at: DateTime<Utc>,
    /// Time spent in the previous state.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepMetric {
    pub start_time: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub success: bool,
}

/// Outcome of the alias switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationResult {
    pub alias_key: String,
    pub target: String,
    /// Alias value before the switch; `None` on a first publish.
    pub previous_target: Option<String>,
    pub activated_at: DateTime<Utc>,
}

/// The first fatal error of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub kind: PipelineErrorKind,
    pub message: String,
    pub state: PipelineState,
}

/// A state change, as reported to the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: PipelineState,
    pub to: PipelineState,
    /// Time since the run started.
    pub elapsed: Duration,
}

/// Mutable state of one publish run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineContext {
    deployment_id: DeploymentId,
    request: PublishRequest,
    state: PipelineState,
    started_at: DateTime<Utc>,
    state_history: Vec<StateHistoryEntry>,
    step_metrics: BTreeMap<Step, StepMetric>,
    artifact_manifest: Option<ArtifactManifest>,
    release_hash: Option<ReleaseHash>,
    activation: Option<ActivationResult>,
    error: Option<ErrorRecord>,
    contract_paths: ContractPaths,
    diagnostics: Diagnostics,
    pub(crate) upload: Option<UploadReport>,
    pub(crate) warm: Option<WarmReport>,
    /// URL the warm and verify checks hit.
    pub(crate) serving_url: Option<String>,
    pub(crate) origin_url: Option<String>,
    pub(crate) preview_url: Option<String>,

    #[serde(skip)]
    started: Instant,
    #[serde(skip)]
    entered_state: Instant,
    #[serde(skip)]
    pub(crate) site: Option<Site>,
    #[serde(skip)]
    pub(crate) contract: Option<GeneratedContract>,
    #[serde(skip)]
    pub(crate) build: Option<BuildOutput>,
    #[serde(skip)]
    pub(crate) packaged: Vec<PackagedFile>,
}

impl PipelineContext {
    pub fn new(request: PublishRequest) -> Self {
        let now = Instant::now();
        let started_at = Utc::now();
        Self {
            deployment_id: DeploymentId::generate(),
            request,
            state: PipelineState::Draft,
            started_at,
            state_history: vec![StateHistoryEntry {
                state: PipelineState::Draft,
                at: started_at,
                duration: Duration::ZERO,
            }],
            step_metrics: BTreeMap::new(),
            artifact_manifest: None,
            release_hash: None,
            activation: None,
            error: None,
            contract_paths: ContractPaths::default(),
            diagnostics: Diagnostics::default(),
            upload: None,
            warm: None,
            serving_url: None,
            origin_url: None,
            preview_url: None,
            started: now,
            entered_state: now,
            site: None,
            contract: None,
            build: None,
            packaged: Vec::new(),
        }
    }

    pub fn deployment_id(&self) -> &DeploymentId {
        &self.deployment_id
    }

    pub fn request(&self) -> &PublishRequest {
        &self.request
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state_history(&self) -> &[StateHistoryEntry] {
        &self.state_history
    }

    pub fn step_metrics(&self) -> &BTreeMap<Step, StepMetric> {
        &self.step_metrics
    }

    pub fn artifact_manifest(&self) -> Option<&ArtifactManifest> {
        self.artifact_manifest.as_ref()
    }

    pub fn release_hash(&self) -> Option<&ReleaseHash> {
        self.release_hash.as_ref()
    }

    pub fn activation(&self) -> Option<&ActivationResult> {
        self.activation.as_ref()
    }

    pub fn error(&self) -> Option<&ErrorRecord> {
        self.error.as_ref()
    }

    pub fn contract_paths(&self) -> &ContractPaths {
        &self.contract_paths
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn upload_report(&self) -> Option<&UploadReport> {
        self.upload.as_ref()
    }

    pub fn preview_url(&self) -> Option<&str> {
        self.preview_url.as_deref()
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    /// Time since the run started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Move to `next`, appending a history entry.
    pub fn transition_to(&mut self, next: PipelineState) -> Result<Transition, PipelineError> {
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }

        let now = Instant::now();
        let transition = Transition {
            from: self.state,
            to: next,
            elapsed: now.duration_since(self.started),
        };
        self.state_history.push(StateHistoryEntry {
            state: next,
            at: Utc::now(),
            duration: now.duration_since(self.entered_state),
        });
        self.state = next;
        self.entered_state = now;
        Ok(transition)
    }

    /// Set the manifest and its release hash. Allowed once per run.
    pub fn set_manifest(&mut self, manifest: ArtifactManifest) -> Result<(), PipelineError> {
        if self.artifact_manifest.is_some() {
            return Err(PipelineError::Internal(
                "artifact manifest is already set for this run".to_string(),
            ));
        }
        self.release_hash = Some(manifest.release_hash.clone());
        self.artifact_manifest = Some(manifest);
        Ok(())
    }

    pub(crate) fn set_activation(&mut self, activation: ActivationResult) {
        self.activation = Some(activation);
    }

    pub(crate) fn record_step(
        &mut self,
        step: Step,
        start_time: DateTime<Utc>,
        duration: Duration,
        success: bool,
    ) {
        self.step_metrics.insert(
            step,
            StepMetric {
                start_time,
                duration,
                success,
            },
        );
    }

    /// Remember the first fatal error; later ones are ignored.
    pub(crate) fn record_error(&mut self, err: &PipelineError) {
        if self.error.is_none() {
            self.error = Some(ErrorRecord {
                kind: err.kind(),
                message: err.to_string(),
                state: self.state,
            });
        }
    }
}
