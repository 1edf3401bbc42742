// ABOUTME: Configuration types and parsing for sitepub.yml.
// ABOUTME: Handles YAML parsing, defaults, validation, and pipeline settings.

mod deserialize;
mod env_value;
mod init;
mod storage;

pub use env_value::EnvValue;
pub use init::init_config;
pub use storage::{StorageBackend, StorageConfig};

use crate::contract::{Site, SiteCatalog};
use crate::error::{Error, Result};
use crate::pipeline::{
    LockPolicy, PipelineSettings, RetryPolicy, VerifySettings, WarmSettings, default_warm_routes,
};
use crate::types::{SiteId, TenantId};
use deserialize::{deserialize_routes, deserialize_sites};
use nonempty::NonEmpty;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "sitepub.yml";
pub const CONFIG_FILENAME_ALT: &str = "sitepub.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".sitepub/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub cdn: CdnConfig,

    #[serde(default)]
    pub verify: VerifyConfig,

    #[serde(default)]
    pub warm: WarmConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    #[serde(deserialize_with = "deserialize_sites")]
    pub sites: NonEmpty<Site>,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CdnConfig {
    /// Public URL of the CDN; previews are served under it.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_purge_timeout", with = "humantime_serde")]
    pub purge_timeout: Duration,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            purge_timeout: default_purge_timeout(),
        }
    }
}

fn default_purge_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyConfig {
    #[serde(default = "default_health_path")]
    pub health_path: String,

    #[serde(default = "default_true")]
    pub check_sitemap: bool,

    #[serde(default = "default_check_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            health_path: default_health_path(),
            check_sitemap: true,
            timeout: default_check_timeout(),
        }
    }
}

fn default_health_path() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_check_timeout() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarmConfig {
    #[serde(default = "default_routes", deserialize_with = "deserialize_routes")]
    pub routes: NonEmpty<String>,

    #[serde(default = "default_check_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for WarmConfig {
    fn default() -> Self {
        Self {
            routes: default_routes(),
            timeout: default_check_timeout(),
        }
    }
}

fn default_routes() -> NonEmpty<String> {
    NonEmpty::from_vec(default_warm_routes()).unwrap_or_else(|| NonEmpty::new("/".to_string()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConcurrencyConfig {
    /// What a second publish of a busy site does.
    #[serde(default)]
    pub lock_policy: LockPolicy,

    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            lock_policy: LockPolicy::default(),
            upload_concurrency: default_upload_concurrency(),
        }
    }
}

fn default_upload_concurrency() -> usize {
    8
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                let mut config = Self::load(path)?;
                config.base_dir = dir.to_path_buf();
                return Ok(config);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Reject values serde accepts but the pipeline cannot use.
    pub fn validate(&self) -> Result<()> {
        for site in &self.sites {
            if !is_http_url(&site.base_url) {
                return Err(Error::InvalidConfig(format!(
                    "site {}: base_url '{}' must be an http(s) URL",
                    site.id, site.base_url
                )));
            }
        }
        if let Some(base) = &self.cdn.base_url
            && !is_http_url(base)
        {
            return Err(Error::InvalidConfig(format!(
                "cdn.base_url '{base}' must be an http(s) URL"
            )));
        }
        if !self.verify.health_path.starts_with('/') {
            return Err(Error::InvalidConfig(format!(
                "verify.health_path '{}' must start with '/'",
                self.verify.health_path
            )));
        }
        if self.retry.attempts == 0 {
            return Err(Error::InvalidConfig(
                "retry.attempts must be at least 1".to_string(),
            ));
        }
        if self.concurrency.upload_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "concurrency.upload_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Find a configured site. Without a tenant the site id must be unambiguous.
    pub fn site(&self, id: &SiteId, tenant: Option<&TenantId>) -> Result<&Site> {
        let mut matches = self
            .sites
            .iter()
            .filter(|s| &s.id == id && tenant.is_none_or(|t| &s.tenant_id == t));
        let site = matches
            .next()
            .ok_or_else(|| Error::UnknownSite(id.to_string()))?;
        if matches.next().is_some() {
            return Err(Error::InvalidConfig(format!(
                "site {id} exists for several tenants; pass --tenant"
            )));
        }
        Ok(site)
    }

    /// Sites with build directories resolved against the config location.
    pub fn catalog(&self) -> SiteCatalog {
        SiteCatalog::new(self.sites.iter().cloned().map(|mut site| {
            if let Some(dir) = &site.build_dir
                && dir.is_relative()
            {
                site.build_dir = Some(self.base_dir.join(dir));
            }
            site
        }))
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            warm: WarmSettings {
                routes: self.warm.routes.iter().cloned().collect(),
                timeout: self.warm.timeout,
                purge_timeout: self.cdn.purge_timeout,
            },
            verify: VerifySettings {
                health_path: self.verify.health_path.clone(),
                check_sitemap: self.verify.check_sitemap,
                timeout: self.verify.timeout,
            },
            retry: self.retry,
            lock_policy: self.concurrency.lock_policy,
            upload_concurrency: self.concurrency.upload_concurrency,
        }
    }

    pub fn template() -> Self {
        Config {
            storage: StorageConfig::default(),
            cdn: CdnConfig::default(),
            verify: VerifyConfig::default(),
            warm: WarmConfig::default(),
            retry: RetryPolicy::default(),
            concurrency: ConcurrencyConfig::default(),
            sites: NonEmpty::new(Site {
                id: SiteId::new("my-site".to_string()),
                tenant_id: TenantId::new("my-team".to_string()),
                name: "My Site".to_string(),
                base_url: "https://www.example.com".to_string(),
                publishable: true,
                pages: Vec::new(),
                actions: Vec::new(),
                build_dir: Some(PathBuf::from("dist")),
            }),
            base_dir: PathBuf::new(),
        }
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
