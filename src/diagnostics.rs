// ABOUTME: Diagnostics accumulator for non-fatal warnings during a publish.
// ABOUTME: Collects warnings that shouldn't fail a publish but should be shown to users.

use serde::Serialize;

/// Collects non-fatal warnings during pipeline operations.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Warnings of one kind.
    pub fn of_kind(&self, kind: WarningKind) -> impl Iterator<Item = &Warning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }
}

/// A non-fatal warning collected during a publish.
#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// A warm request for a critical route failed.
    pub fn warm_route(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::WarmRoute,
            message: message.into(),
        }
    }

    /// A CDN purge failed or timed out.
    pub fn cdn_purge(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::CdnPurge,
            message: message.into(),
        }
    }

    /// A best-effort event could not be delivered.
    pub fn event_delivery(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::EventDelivery,
            message: message.into(),
        }
    }

    /// Rollback completed but left something behind (e.g. stale cache).
    pub fn rollback(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Rollback,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Warming a critical route failed; the first visitor pays the latency.
    WarmRoute,
    /// CDN purge failed; stale content may be served until it expires.
    CdnPurge,
    /// A non-critical event was not delivered.
    EventDelivery,
    /// Rollback side effect failed.
    Rollback,
}
