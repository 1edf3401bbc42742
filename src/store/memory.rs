// ABOUTME: In-memory artifact store.
// ABOUTME: Used by tests and dry runs; enforces the same write-once rules as disk storage.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::keys::{is_release_scoped, validate_key};
use super::presign::{Presigner, object_url};
use super::{
    ArtifactStore, ObjectHead, ObjectSummary, PresignMethod, PresignedUrl, PutOptions, PutResult,
    StoreError,
};
use crate::types::sha256_hex;

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    head: ObjectHead,
}

/// Artifact store that keeps everything in process memory.
#[derive(Debug)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    aliases: RwLock<HashMap<String, String>>,
    presigner: Presigner,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("memory://store")
    }
}

impl MemoryStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            aliases: RwLock::new(HashMap::new()),
            presigner: Presigner::new(base_url, "memory-store"),
        }
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        opts: &PutOptions,
    ) -> Result<PutResult, StoreError> {
        validate_key(key)?;
        let immutable = opts.immutable || is_release_scoped(key);
        let etag = sha256_hex(&body);

        // Check and insert under one write lock so concurrent writers cannot both win.
        let mut objects = self.objects.write();
        if let Some(existing) = objects.get(key)
            && existing.head.immutable
            && !opts.overwrite_immutable
        {
            return Err(StoreError::ImmutableObject {
                key: key.to_string(),
            });
        }

        let head = ObjectHead {
            key: key.to_string(),
            size: body.len() as u64,
            etag: etag.clone(),
            last_modified: Utc::now(),
            content_type: opts.content_type.clone(),
            cache_control: opts.cache_control.clone(),
            immutable,
        };
        objects.insert(key.to_string(), StoredObject { body, head });

        Ok(PutResult {
            etag,
            url: self.public_url(key),
        })
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, StoreError> {
        self.objects
            .read()
            .get(key)
            .map(|object| object.body.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn head_object(&self, key: &str) -> Result<ObjectHead, StoreError> {
        self.objects
            .read()
            .get(key)
            .map(|object| object.head.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
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
        Ok(self
            .objects
            .read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectSummary {
                key: key.clone(),
                size: object.head.size,
                last_modified: object.head.last_modified,
            })
            .collect())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        if prefix.is_empty() {
            return Err(StoreError::InvalidKey {
                key: String::new(),
                reason: "refusing to delete an empty prefix",
            });
        }

        let mut objects = self.objects.write();
        let before = objects.len();
        objects.retain(|key, _| !key.starts_with(prefix));
        Ok(before - objects.len())
    }

    fn public_url(&self, key: &str) -> String {
        object_url(self.presigner.base_url(), key)
    }

    async fn set_alias(&self, alias_key: &str, target: &str) -> Result<(), StoreError> {
        validate_key(alias_key)?;
        self.aliases
            .write()
            .insert(alias_key.to_string(), target.to_string());
        Ok(())
    }

    async fn get_alias(&self, alias_key: &str) -> Result<String, StoreError> {
        self.aliases
            .read()
            .get(alias_key)
            .cloned()
            .ok_or_else(|| StoreError::AliasNotFound(alias_key.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.objects.read().contains_key(key))
    }
}
