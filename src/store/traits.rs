// ABOUTME: Artifact store capability trait and its request/response types.
// ABOUTME: Content-addressed object storage with write-once objects and alias pointers.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Object storage with alias indirection.
///
/// Implementations must make `set_alias` atomic for concurrent readers: a
/// reader resolving an alias sees either the old or the new target. Writes to
/// immutable keys must fail with [`StoreError::ImmutableObject`] instead of
/// overwriting, unless [`PutOptions::overwrite_immutable`] is set.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write an object.
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        opts: &PutOptions,
    ) -> Result<PutResult, StoreError>;

    /// Read an object's full body.
    async fn get_object(&self, key: &str) -> Result<Bytes, StoreError>;

    /// Read an object's metadata without its body.
    async fn head_object(&self, key: &str) -> Result<ObjectHead, StoreError>;

    /// Create a time-limited URL that permits uploading to `key`.
    async fn presign_put(&self, key: &str, expires_in: Duration)
    -> Result<PresignedUrl, StoreError>;

    /// Create a time-limited URL that permits downloading `key`.
    async fn presign_get(&self, key: &str, expires_in: Duration)
    -> Result<PresignedUrl, StoreError>;

    /// List objects whose key starts with `prefix`, ordered by key.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StoreError>;

    /// Delete every object under `prefix`. Returns the number removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError>;

    /// Public (unsigned) URL for a key.
    fn public_url(&self, key: &str) -> String;

    /// Point `alias_key` at `target`.
    async fn set_alias(&self, alias_key: &str, target: &str) -> Result<(), StoreError>;

    /// Resolve an alias. Fails with [`StoreError::AliasNotFound`] if unset.
    async fn get_alias(&self, alias_key: &str) -> Result<String, StoreError>;

    /// Check whether an object exists.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
}

/// Options for [`ArtifactStore::put_object`].
#[derive(Debug, Clone)]
pub struct PutOptions {
    pub content_type: String,
    pub cache_control: Option<String>,
    /// Mark the object write-once.
    pub immutable: bool,
    /// Administrative override that replaces an existing immutable object.
    pub overwrite_immutable: bool,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            content_type: "application/octet-stream".to_string(),
            cache_control: None,
            immutable: false,
            overwrite_immutable: false,
        }
    }
}

impl PutOptions {
    pub fn immutable(content_type: impl Into<String>, cache_control: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            cache_control: Some(cache_control.into()),
            immutable: true,
            overwrite_immutable: false,
        }
    }
}

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    /// Hex SHA-256 of the stored body.
    pub etag: String,
    pub url: String,
}

/// Object metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHead {
    pub key: String,
    pub size: u64,
    /// Hex SHA-256 of the stored body.
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub content_type: String,
    pub cache_control: Option<String>,
    pub immutable: bool,
}

/// Entry returned by [`ArtifactStore::list_objects`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// HTTP method a presigned URL is valid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PresignMethod {
    Get,
    Put,
}

impl PresignMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresignMethod::Get => "GET",
            PresignMethod::Put => "PUT",
        }
    }
}

/// A signed, expiring URL for delegated access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresignedUrl {
    pub url: String,
    pub method: PresignMethod,
    pub expires_at: DateTime<Utc>,
}

/// Errors from artifact store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("alias not found: {0}")]
    AliasNotFound(String),

    #[error("immutable object already exists: {key}")]
    ImmutableObject { key: String },

    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub(crate) fn io(key: &str, source: std::io::Error) -> Self {
        StoreError::Io {
            key: key.to_string(),
            source,
        }
    }

    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Io { .. } | StoreError::Backend(_))
    }
}
