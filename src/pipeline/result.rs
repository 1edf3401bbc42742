// ABOUTME: Outcome of a successful publish.
// ABOUTME: URLs, contract paths, per-step timings and collected warnings.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::contract::ContractPaths;
use crate::diagnostics::Warning;
use crate::types::{DeploymentId, ReleaseHash};

use super::context::{ActivationResult, PipelineContext};
use super::state::Step;
use super::checks::WarmReport;
use super::upload::UploadReport;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub step_durations_ms: BTreeMap<Step, u64>,
    pub total_duration_ms: u64,
    pub artifact_bytes: u64,
    pub file_count: usize,
    pub objects_uploaded: usize,
    pub objects_reused: usize,
}

impl PerformanceMetrics {
    pub(crate) fn from_context(ctx: &PipelineContext, upload: Option<&UploadReport>) -> Self {
        let manifest = ctx.artifact_manifest();
        Self {
            step_durations_ms: ctx
                .step_metrics()
                .iter()
                .map(|(step, metric)| (*step, millis(metric.duration)))
                .collect(),
            total_duration_ms: millis(ctx.elapsed()),
            artifact_bytes: manifest.map(|m| m.total_bytes()).unwrap_or(0),
            file_count: manifest.map(|m| m.files.len()).unwrap_or(0),
            objects_uploaded: upload.map(|u| u.uploaded).unwrap_or(0),
            objects_reused: upload.map(|u| u.reused).unwrap_or(0),
        }
    }
}

pub(crate) fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Returned by a successful [`Pipeline::publish`](super::Pipeline::publish).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    pub deployment_id: DeploymentId,
    pub release_hash: ReleaseHash,
    /// Where visitors reach the site.
    pub cdn_url: String,
    /// Storage URL of the release itself.
    pub origin_url: String,
    pub preview_url: Option<String>,
    pub contract_paths: ContractPaths,
    pub activation: ActivationResult,
    pub warm: WarmReport,
    pub metrics: PerformanceMetrics,
    pub warnings: Vec<Warning>,
}
