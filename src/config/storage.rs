// ABOUTME: Storage section of sitepub.yml.
// ABOUTME: Opens the configured artifact store backend.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::EnvValue;
use crate::error::Result;
use crate::store::{ArtifactStore, LocalStore, MemoryStore, Presigner};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Objects under a local directory.
    #[default]
    Local,
    /// Process memory; nothing survives the command.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Store directory, relative to the config file.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Public URL the store's objects are served under.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Key for presigned URLs. A random key is used when unset.
    #[serde(default)]
    pub presign_secret: Option<EnvValue>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".sitepub/store")
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root: default_root(),
            base_url: default_base_url(),
            presign_secret: None,
        }
    }
}

impl StorageConfig {
    /// Store root resolved against `base_dir`.
    pub fn root_in(&self, base_dir: &Path) -> PathBuf {
        if self.root.is_absolute() {
            self.root.clone()
        } else {
            base_dir.join(&self.root)
        }
    }

    pub fn open(&self, base_dir: &Path) -> Result<Arc<dyn ArtifactStore>> {
        match self.backend {
            StorageBackend::Memory => Ok(Arc::new(MemoryStore::new(self.base_url.clone()))),
            StorageBackend::Local => {
                let secret = match &self.presign_secret {
                    Some(secret) => secret.resolve()?,
                    None => {
                        tracing::warn!(
                            "storage.presign_secret is not set; presigned URLs are only valid for this run"
                        );
                        uuid::Uuid::new_v4().to_string()
                    }
                };
                Ok(Arc::new(LocalStore::new(
                    self.root_in(base_dir),
                    Presigner::new(self.base_url.clone(), secret),
                )))
            }
        }
    }
}
