// ABOUTME: Typed notifications emitted by the publishing pipeline.
// ABOUTME: EventBus trait plus a tokio broadcast implementation with retained history.

mod bus;

pub use bus::BroadcastBus;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contract::ContractPaths;
use crate::pipeline::{DeploymentIntent, PipelineState};
use crate::types::{DeploymentId, ReleaseHash, SiteId, TenantId};

/// Every notification the pipeline produces, tagged by its wire name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    #[serde(rename = "pipeline.state_changed")]
    StateChanged(StateChanged),

    #[serde(rename = "site.published")]
    SitePublished(SitePublished),

    #[serde(rename = "kb.refreshRequested")]
    KbRefreshRequested(KbRefreshRequested),
}

impl PipelineEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::StateChanged(_) => "pipeline.state_changed",
            PipelineEvent::SitePublished(_) => "site.published",
            PipelineEvent::KbRefreshRequested(_) => "kb.refreshRequested",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChanged {
    pub deployment_id: DeploymentId,
    pub site_id: SiteId,
    pub previous_state: PipelineState,
    pub current_state: PipelineState,
    /// Milliseconds since the run started.
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitePublished {
    pub deployment_id: DeploymentId,
    pub site_id: SiteId,
    pub tenant_id: TenantId,
    pub release_hash: ReleaseHash,
    pub deployment_intent: DeploymentIntent,
    pub published_at: DateTime<Utc>,
    pub contract_paths: ContractPaths,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KbRefreshRequested {
    pub site_id: SiteId,
    pub release_hash: ReleaseHash,
    pub reason: String,
}

/// Publish side of the notification bus.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: PipelineEvent) -> Result<(), EventError>;
}

/// Errors from event delivery.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("event bus is closed")]
    Closed,

    #[error("event delivery failed: {0}")]
    Delivery(String),
}
