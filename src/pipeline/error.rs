// ABOUTME: Error types for publishing pipeline runs.
// ABOUTME: PipelineError classifies failures, PublishFailure carries the failed run's context.

use snafu::Snafu;

use crate::build::BuildError;
use crate::cdn::CdnError;
use crate::contract::ContractError;
use crate::events::EventError;
use crate::probe::ProbeError;
use crate::store::StoreError;
use crate::types::{SiteId, TenantId};

use super::context::PipelineContext;
use super::lock::LockInfo;
use super::state::PipelineState;

/// Errors raised by pipeline steps.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("site not found: {0}")]
    SiteNotFound(SiteId),

    #[error("site {site} does not belong to tenant {tenant}")]
    TenantMismatch { site: SiteId, tenant: TenantId },

    #[error("site {0} is not publishable")]
    NotPublishable(SiteId),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("build failed: {0}")]
    Build(#[from] BuildError),

    #[error("contract generation failed: {0}")]
    Contract(String),

    #[error("duplicate artifact path: {0}")]
    DuplicatePath(String),

    #[error("packaging failed: {0}")]
    Packaging(String),

    /// An immutable release object already holds different bytes.
    #[error("immutability violation: {key} already exists with different content")]
    ImmutabilityViolation { key: String },

    #[error("storage error: {0}")]
    Store(#[source] StoreError),

    #[error("CDN error: {0}")]
    Cdn(#[from] CdnError),

    #[error("event bus error: {0}")]
    Event(#[from] EventError),

    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("verification failed: {check} check at {url} returned HTTP {status}")]
    VerificationFailed {
        check: &'static str,
        url: String,
        status: u16,
    },

    #[error("No previous deployment available for rollback")]
    RollbackUnavailable,

    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    #[error("publish already in progress for {site}: held by {holder}")]
    PublishInProgress { site: String, holder: LockInfo },

    #[error("illegal state transition from {from} to {to}")]
    IllegalTransition {
        from: PipelineState,
        to: PipelineState,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineErrorKind {
    /// Request refused before any work started.
    Validation,
    /// Build, contract or packaging produced unusable output.
    Artifact,
    /// Attempted overwrite of an immutable release object.
    Immutability,
    /// Network or backend failure that may succeed on retry.
    Transient,
    /// Health or sitemap check failed.
    Verification,
    /// Rollback could not restore the previous release.
    Rollback,
    /// Another publish for the same site holds the lock.
    Concurrency,
    /// Broken pipeline invariant.
    Internal,
}

impl PipelineError {
    pub fn kind(&self) -> PipelineErrorKind {
        match self {
            PipelineError::SiteNotFound(_)
            | PipelineError::TenantMismatch { .. }
            | PipelineError::NotPublishable(_)
            | PipelineError::InvalidRequest(_) => PipelineErrorKind::Validation,
            PipelineError::Build(_)
            | PipelineError::Contract(_)
            | PipelineError::DuplicatePath(_)
            | PipelineError::Packaging(_) => PipelineErrorKind::Artifact,
            PipelineError::ImmutabilityViolation { .. } => PipelineErrorKind::Immutability,
            PipelineError::Store(e) if e.is_transient() => PipelineErrorKind::Transient,
            PipelineError::Store(_) => PipelineErrorKind::Internal,
            PipelineError::Cdn(_) | PipelineError::Event(_) => PipelineErrorKind::Transient,
            PipelineError::Probe(_) | PipelineError::VerificationFailed { .. } => {
                PipelineErrorKind::Verification
            }
            PipelineError::RollbackUnavailable | PipelineError::RollbackFailed(_) => {
                PipelineErrorKind::Rollback
            }
            PipelineError::PublishInProgress { .. } => PipelineErrorKind::Concurrency,
            PipelineError::IllegalTransition { .. } | PipelineError::Internal(_) => {
                PipelineErrorKind::Internal
            }
        }
    }

    /// Whether repeating the failed call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Store(e) => e.is_transient(),
            PipelineError::Probe(e) => e.is_transient(),
            PipelineError::VerificationFailed { .. } => true,
            PipelineError::Cdn(CdnError::Request(_)) => true,
            _ => false,
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ImmutableObject { key } => PipelineError::ImmutabilityViolation { key },
            other => PipelineError::Store(other),
        }
    }
}

impl From<ContractError> for PipelineError {
    fn from(err: ContractError) -> Self {
        match err {
            ContractError::SiteNotFound(site) => PipelineError::SiteNotFound(site),
            ContractError::TenantMismatch { site, tenant } => {
                PipelineError::TenantMismatch { site, tenant }
            }
            ContractError::Generation(msg) => PipelineError::Contract(msg),
        }
    }
}

/// A publish that did not succeed.
///
/// Carries the error that stopped the run, the rollback error if rollback
/// was attempted and failed, and the run's final context.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[snafu(display("publish {} ended {}: {}", context.deployment_id(), context.state(), source))]
pub struct PublishFailure {
    pub source: PipelineError,
    pub rollback_error: Option<PipelineError>,
    pub context: Box<PipelineContext>,
}

impl PublishFailure {
    pub fn error(&self) -> &PipelineError {
        &self.source
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.source.kind()
    }

    pub fn rollback_error(&self) -> Option<&PipelineError> {
        self.rollback_error.as_ref()
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn final_state(&self) -> PipelineState {
        self.context.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immutable_store_errors_become_violations() {
        let err: PipelineError = StoreError::ImmutableObject {
            key: "t1/s1/releases/x/a".to_string(),
        }
        .into();
        assert_eq!(err.kind(), PipelineErrorKind::Immutability);
        assert!(!err.is_retryable());
    }

    #[test]
    fn backend_store_errors_are_transient() {
        let err: PipelineError = StoreError::Backend("503".to_string()).into();
        assert_eq!(err.kind(), PipelineErrorKind::Transient);
        assert!(err.is_retryable());
    }

    #[test]
    fn malformed_probe_urls_are_not_retried() {
        let err: PipelineError = ProbeError::UnsupportedScheme("ftp".to_string()).into();
        assert_eq!(err.kind(), PipelineErrorKind::Verification);
        assert!(!err.is_retryable());

        let err: PipelineError = ProbeError::Transport {
            url: "https://s1.test/".to_string(),
            reason: "connection reset".to_string(),
        }
        .into();
        assert!(err.is_retryable());
    }

    #[test]
    fn contract_lookup_errors_are_validation() {
        let err: PipelineError =
            ContractError::SiteNotFound(SiteId::parse("s9").unwrap()).into();
        assert_eq!(err.kind(), PipelineErrorKind::Validation);
    }

    #[test]
    fn rollback_unavailable_message_is_stable() {
        assert_eq!(
            PipelineError::RollbackUnavailable.to_string(),
            "No previous deployment available for rollback"
        );
    }
}
