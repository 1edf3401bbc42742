// ABOUTME: Publish request input and deployment intent.
// ABOUTME: Requests are immutable once a run starts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::build::BuildParameters;
use crate::store::AliasSlot;
use crate::types::{DeploymentId, SiteId, TenantId};

/// Why a release is being published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentIntent {
    Preview,
    #[default]
    Production,
}

impl DeploymentIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentIntent::Preview => "preview",
            DeploymentIntent::Production => "production",
        }
    }

    /// Alias slot switched when this intent is activated.
    pub fn alias_slot(&self) -> AliasSlot {
        match self {
            DeploymentIntent::Preview => AliasSlot::Preview,
            DeploymentIntent::Production => AliasSlot::Live,
        }
    }
}

impl fmt::Display for DeploymentIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentIntent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preview" => Ok(DeploymentIntent::Preview),
            "production" => Ok(DeploymentIntent::Production),
            other => Err(format!(
                "unknown deployment intent '{other}' (expected preview or production)"
            )),
        }
    }
}

/// Input to [`Pipeline::publish`](super::Pipeline::publish).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub site_id: SiteId,
    pub tenant_id: TenantId,
    pub deployment_intent: DeploymentIntent,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub build_parameters: Option<BuildParameters>,
    /// Release the alias returns to if this run has to roll back.
    #[serde(default)]
    pub previous_deployment_id: Option<DeploymentId>,
}

impl PublishRequest {
    pub fn new(site_id: SiteId, tenant_id: TenantId, intent: DeploymentIntent) -> Self {
        Self {
            site_id,
            tenant_id,
            deployment_intent: intent,
            revision: None,
            build_parameters: None,
            previous_deployment_id: None,
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn with_build_parameters(mut self, params: BuildParameters) -> Self {
        self.build_parameters = Some(params);
        self
    }

    pub fn with_previous_deployment(mut self, previous: DeploymentId) -> Self {
        self.previous_deployment_id = Some(previous);
        self
    }

    /// Build environment, defaulting to production.
    pub fn environment(&self) -> &str {
        self.build_parameters
            .as_ref()
            .map(|p| p.environment.as_str())
            .unwrap_or("production")
    }
}
