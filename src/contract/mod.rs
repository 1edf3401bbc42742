// ABOUTME: Site records and the crawler-facing contract files generated for them.
// ABOUTME: SiteRepository resolves sites, ContractGenerator renders sitemap/robots/actions.

mod catalog;

pub use catalog::SiteCatalog;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::{SiteId, TenantId};

pub const SITEMAP_PATH: &str = "sitemap.xml";
pub const ROBOTS_PATH: &str = "robots.txt";
pub const ACTIONS_PATH: &str = ".well-known/actions.json";
pub const CONTRACT_PATH: &str = ".well-known/site-contract.json";

/// A publishable site owned by a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    #[serde(rename = "tenant")]
    pub tenant_id: TenantId,
    pub name: String,
    pub base_url: String,
    /// Production publishes are refused while this is false.
    #[serde(default = "default_publishable")]
    pub publishable: bool,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub actions: Vec<SiteAction>,
    /// Directory holding the built assets, if the site has any.
    #[serde(default)]
    pub build_dir: Option<PathBuf>,
}

fn default_publishable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// An action agents may invoke on the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteAction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Release-relative paths of the generated contract files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractPaths {
    pub sitemap: String,
    pub robots: String,
    pub actions: String,
    pub contract: String,
}

impl Default for ContractPaths {
    fn default() -> Self {
        Self {
            sitemap: SITEMAP_PATH.to_string(),
            robots: ROBOTS_PATH.to_string(),
            actions: ACTIONS_PATH.to_string(),
            contract: CONTRACT_PATH.to_string(),
        }
    }
}

impl ContractPaths {
    pub fn all(&self) -> [&str; 4] {
        [&self.sitemap, &self.robots, &self.actions, &self.contract]
    }
}

/// Whether a release-relative path is one of the crawler-facing contract files.
pub fn is_contract_path(path: &str) -> bool {
    matches!(path, SITEMAP_PATH | ROBOTS_PATH | ACTIONS_PATH | CONTRACT_PATH)
}

/// Options for contract generation.
#[derive(Debug, Clone, Default)]
pub struct ContractOptions {
    /// Overrides the site's base URL (custom domains).
    pub base_url: Option<String>,
    /// Preview releases ask crawlers to stay away.
    pub preview: bool,
}

/// Rendered contract files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedContract {
    pub sitemap_text: String,
    pub robots_text: String,
    pub actions_json: String,
    pub contract_json: String,
}

impl GeneratedContract {
    /// Pair each file with its release-relative path.
    pub fn files<'a>(&'a self, paths: &'a ContractPaths) -> [(&'a str, &'a str); 4] {
        [
            (&paths.sitemap, &self.sitemap_text),
            (&paths.robots, &self.robots_text),
            (&paths.actions, &self.actions_json),
            (&paths.contract, &self.contract_json),
        ]
    }
}

/// Site lookup.
#[async_trait]
pub trait SiteRepository: Send + Sync {
    /// Resolve a site, checking that `tenant` owns it.
    async fn find_by_id(&self, site: &SiteId, tenant: &TenantId) -> Result<Site, ContractError>;
}

/// Contract file rendering.
#[async_trait]
pub trait ContractGenerator: Send + Sync {
    async fn generate_contract(
        &self,
        site: &Site,
        opts: &ContractOptions,
    ) -> Result<GeneratedContract, ContractError>;
}

/// Errors from site lookup and contract generation.
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("site not found: {0}")]
    SiteNotFound(SiteId),

    #[error("site {site} does not belong to tenant {tenant}")]
    TenantMismatch { site: SiteId, tenant: TenantId },

    #[error("contract generation failed: {0}")]
    Generation(String),
}
