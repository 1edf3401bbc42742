// ABOUTME: Filesystem-backed artifact store.
// ABOUTME: Write-once via atomic hard links, aliases via temp file + rename.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::keys::{is_release_scoped, validate_key};
use super::presign::{Presigner, object_url};
use super::{
    ArtifactStore, ObjectHead, ObjectSummary, PresignMethod, PresignedUrl, PutOptions, PutResult,
    StoreError,
};
use crate::types::sha256_hex;

const OBJECTS_DIR: &str = "objects";
const META_DIR: &str = "meta";
const ALIASES_DIR: &str = "aliases";

/// Sidecar metadata written next to each object.
#[derive(Debug, Serialize, Deserialize)]
struct StoredMeta {
    etag: String,
    content_type: String,
    cache_control: Option<String>,
    immutable: bool,
}

/// Artifact store rooted at a local directory.
///
/// Layout:
/// - `objects/{key}` object bodies
/// - `meta/{key}.json` content type, cache policy, etag, immutability
/// - `aliases/{alias_key}` alias targets
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    presigner: Presigner,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, presigner: Presigner) -> Self {
        Self {
            root: root.into(),
            presigner,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(OBJECTS_DIR).join(key)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(META_DIR).join(format!("{key}.json"))
    }

    fn alias_path(&self, alias_key: &str) -> PathBuf {
        self.root.join(ALIASES_DIR).join(alias_key)
    }

    async fn read_meta(&self, key: &str) -> Result<Option<StoredMeta>, StoreError> {
        match tokio::fs::read(self.meta_path(key)).await {
            Ok(raw) => serde_json::from_slice(&raw).map(Some).map_err(|e| {
                StoreError::Backend(format!("corrupt metadata for {key}: {e}"))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(key, e)),
        }
    }

    /// Whether an object already at `key` must not be replaced.
    async fn existing_is_immutable(&self, key: &str) -> Result<bool, StoreError> {
        if !self.exists(key).await? {
            return Ok(false);
        }
        let meta = self.read_meta(key).await?;
        Ok(is_release_scoped(key) || meta.is_some_and(|m| m.immutable))
    }
}

/// Write `body` to a sibling temp file of `path` and return the temp path.
async fn write_temp(path: &Path, body: &[u8], key: &str) -> Result<PathBuf, StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(key, e))?;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));
    tokio::fs::write(&tmp, body)
        .await
        .map_err(|e| StoreError::io(key, e))?;
    Ok(tmp)
}

/// Atomically replace `path` with `body`.
async fn replace_file(path: &Path, body: &[u8], key: &str) -> Result<(), StoreError> {
    let tmp = write_temp(path, body, key).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::io(key, e));
    }
    Ok(())
}

fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .is_some_and(|n| n.starts_with('.') && n.ends_with(".tmp"))
}

#[async_trait]
impl ArtifactStore for LocalStore {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        opts: &PutOptions,
    ) -> Result<PutResult, StoreError> {
        validate_key(key)?;
        let immutable = opts.immutable || is_release_scoped(key);

        if !opts.overwrite_immutable && self.existing_is_immutable(key).await? {
            return Err(StoreError::ImmutableObject {
                key: key.to_string(),
            });
        }

        let path = self.object_path(key);
        let tmp = write_temp(&path, &body, key).await?;

        if immutable && !opts.overwrite_immutable {
            // hard_link fails if the destination exists, so two racing writers
            // cannot both create the object.
            let linked = tokio::fs::hard_link(&tmp, &path).await;
            let _ = tokio::fs::remove_file(&tmp).await;
            match linked {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    return Err(StoreError::ImmutableObject {
                        key: key.to_string(),
                    });
                }
                Err(e) => return Err(StoreError::io(key, e)),
            }
        } else if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::io(key, e));
        }

        let etag = sha256_hex(&body);
        let meta = StoredMeta {
            etag: etag.clone(),
            content_type: opts.content_type.clone(),
            cache_control: opts.cache_control.clone(),
            immutable,
        };
        let meta_json = serde_json::to_vec(&meta)
            .map_err(|e| StoreError::Backend(format!("failed to encode metadata: {e}")))?;
        replace_file(&self.meta_path(key), &meta_json, key).await?;

        tracing::debug!(key, size = body.len(), immutable, "stored object");

        Ok(PutResult {
            etag,
            url: self.public_url(key),
        })
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, StoreError> {
        validate_key(key)?;
        match tokio::fs::read(self.object_path(key)).await {
            Ok(body) => Ok(Bytes::from(body)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key.to_string())),
            Err(e) => Err(StoreError::io(key, e)),
        }
    }

    async fn head_object(&self, key: &str) -> Result<ObjectHead, StoreError> {
        validate_key(key)?;
        let path = self.object_path(key);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.to_string()));
            }
            Err(e) => return Err(StoreError::io(key, e)),
        };
        let last_modified: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());

        let (etag, content_type, cache_control, immutable) = match self.read_meta(key).await? {
            Some(meta) => (
                meta.etag,
                meta.content_type,
                meta.cache_control,
                meta.immutable,
            ),
            None => {
                // Metadata missing (interrupted write): derive what we can from the body.
                let body = self.get_object(key).await?;
                (
                    sha256_hex(&body),
                    PutOptions::default().content_type,
                    None,
                    is_release_scoped(key),
                )
            }
        };

        Ok(ObjectHead {
            key: key.to_string(),
            size: metadata.len(),
            etag,
            last_modified,
            content_type,
            cache_control,
            immutable,
        })
    }

    async fn presign_put(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUrl, StoreError> {
        validate_key(key)?;
        self.presigner.sign(PresignMethod::Put, key, expires_in)
    }

    async fn presign_get(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUrl, StoreError> {
        validate_key(key)?;
        self.presigner.sign(PresignMethod::Get, key, expires_in)
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StoreError> {
        let objects_root = self.root.join(OBJECTS_DIR);
        let prefix = prefix.to_string();

        let walked = tokio::task::spawn_blocking(move || -> Result<Vec<ObjectSummary>, StoreError> {
            let mut found = Vec::new();
            if !objects_root.exists() {
                return Ok(found);
            }
            for entry in walkdir::WalkDir::new(&objects_root) {
                let entry = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
                if !entry.file_type().is_file() || is_temp_file(entry.path()) {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&objects_root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                if !key.starts_with(&prefix) {
                    continue;
                }
                let metadata = entry
                    .metadata()
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                found.push(ObjectSummary {
                    key,
                    size: metadata.len(),
                    last_modified: metadata
                        .modified()
                        .map(DateTime::from)
                        .unwrap_or_else(|_| Utc::now()),
                });
            }
            found.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(found)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("listing task failed: {e}")))?;

        walked
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        if prefix.is_empty() {
            return Err(StoreError::InvalidKey {
                key: String::new(),
                reason: "refusing to delete an empty prefix",
            });
        }

        let objects = self.list_objects(prefix).await?;
        for object in &objects {
            match tokio::fs::remove_file(self.object_path(&object.key)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(&object.key, e)),
            }
            let _ = tokio::fs::remove_file(self.meta_path(&object.key)).await;
        }
        Ok(objects.len())
    }

    fn public_url(&self, key: &str) -> String {
        object_url(self.presigner.base_url(), key)
    }

    async fn set_alias(&self, alias_key: &str, target: &str) -> Result<(), StoreError> {
        validate_key(alias_key)?;
        replace_file(&self.alias_path(alias_key), target.as_bytes(), alias_key).await
    }

    async fn get_alias(&self, alias_key: &str) -> Result<String, StoreError> {
        validate_key(alias_key)?;
        match tokio::fs::read_to_string(self.alias_path(alias_key)).await {
            Ok(target) => Ok(target.trim().to_string()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::AliasNotFound(alias_key.to_string()))
            }
            Err(e) => Err(StoreError::io(alias_key, e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        match tokio::fs::metadata(self.object_path(key)).await {
            Ok(m) => Ok(m.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(key, e)),
        }
    }
}
