// ABOUTME: CDN provider abstraction: cache purges, preview URLs, caching rules.
// ABOUTME: Vendor specifics stay behind the CdnProvider trait.

mod local;

pub use local::{CdnCall, LocalCdn};

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::types::ReleaseHash;

/// Cache purge and preview operations.
#[async_trait]
pub trait CdnProvider: Send + Sync {
    /// Purge specific URLs.
    async fn purge_urls(&self, urls: &[String]) -> Result<PurgeResult, CdnError>;

    /// Purge every cached entry carrying one of `tags`.
    async fn purge_by_tag(&self, tags: &[String]) -> Result<PurgeResult, CdnError>;

    /// Purge every cached entry under a path prefix.
    async fn purge_by_prefix(&self, prefix: &str) -> Result<PurgeResult, CdnError>;

    /// Purge the whole cache.
    async fn purge_all(&self) -> Result<PurgeResult, CdnError>;

    /// URL that serves a specific release before (or without) activation.
    async fn create_preview_url(
        &self,
        origin_url: &str,
        release: &ReleaseHash,
        opts: &PreviewOptions,
    ) -> Result<String, CdnError>;

    /// Replace the provider's path caching rules.
    async fn set_caching_rules(&self, rules: &[CachingRule]) -> Result<(), CdnError>;

    /// Check credentials and zone configuration.
    async fn validate_configuration(&self) -> Result<bool, CdnError>;
}

/// Outcome of a purge request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeResult {
    pub success: bool,
    pub purged_count: Option<u64>,
    pub estimated_wait_time_seconds: Option<u64>,
    pub errors: Vec<String>,
}

impl PurgeResult {
    pub fn succeeded(purged_count: u64) -> Self {
        Self {
            success: true,
            purged_count: Some(purged_count),
            estimated_wait_time_seconds: Some(0),
            errors: Vec::new(),
        }
    }
}

/// Options for [`CdnProvider::create_preview_url`].
#[derive(Debug, Clone, Default)]
pub struct PreviewOptions {
    pub ttl: Option<Duration>,
    pub label: Option<String>,
}

/// Cache-Control policy for paths matching a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachingRule {
    pub path_pattern: String,
    pub cache_control: String,
}

/// Errors from CDN operations.
#[derive(Debug, thiserror::Error)]
pub enum CdnError {
    #[error("CDN request failed: {0}")]
    Request(String),

    #[error("CDN configuration invalid: {0}")]
    Configuration(String),

    #[error("operation not supported by this provider: {0}")]
    Unsupported(&'static str),
}

/// Cache tags used to address everything a site publishes.
pub fn site_tags(tenant: &str, site: &str) -> Vec<String> {
    vec![format!("site:{site}"), format!("tenant:{tenant}")]
}

/// Site tags plus the release tag.
pub fn release_tags(tenant: &str, site: &str, release: &ReleaseHash) -> Vec<String> {
    let mut tags = site_tags(tenant, site);
    tags.push(format!("release:{release}"));
    tags
}
