// ABOUTME: Per-site publish locks so two runs never race on the same alias.
// ABOUTME: The lock is a write-once object in the artifact store, so it holds across processes.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::store::{ArtifactStore, PutOptions, ReleaseLayout, StoreError};
use crate::types::{DeploymentId, SiteId, TenantId};

use super::PipelineError;
use super::package::NO_CACHE;

/// How often a queued publish checks whether the lock was released.
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Who holds a site lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine running the publish.
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    /// `{tenant}/{site}`
    pub site: String,
    pub deployment_id: Option<DeploymentId>,
}

impl LockInfo {
    /// Lock info for the current process.
    pub fn new(site: impl Into<String>, deployment_id: Option<DeploymentId>) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            site: site.into(),
            deployment_id,
        }
    }

    /// How long the lock has been held.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    /// Locks older than an hour belong to a publish that died without releasing.
    pub fn is_stale(&self) -> bool {
        self.age().num_hours() >= 1
    }
}

impl fmt::Display for LockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pid {}) since {}", self.holder, self.pid, self.started_at)?;
        if let Some(id) = &self.deployment_id {
            write!(f, ", deployment {id}")?;
        }
        Ok(())
    }
}

/// What to do when a site is already being published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockPolicy {
    /// Fail immediately with [`PipelineError::PublishInProgress`].
    #[default]
    Reject,
    /// Wait for the running publish to finish.
    Queue,
}

/// State of an existing lock object.
enum Existing {
    Held(LockInfo),
    Unreadable,
    Gone,
}

/// Publish locks keyed by `(tenant, site)`, stored at
/// `{tenant}/{site}/locks/publish.json`.
///
/// Acquisition is an immutable put, so the store's create-if-absent write
/// decides the winner even between processes. Stale or unreadable locks are
/// broken with a warning.
pub struct SiteLocks {
    store: Arc<dyn ArtifactStore>,
    policy: LockPolicy,
}

impl fmt::Debug for SiteLocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteLocks")
            .field("policy", &self.policy)
            .finish()
    }
}

impl SiteLocks {
    pub fn new(store: Arc<dyn ArtifactStore>, policy: LockPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    /// Acquire the lock for a site.
    ///
    /// Release it with [`SiteLockGuard::release`]; a guard dropped without
    /// releasing removes the lock in a background task.
    pub async fn acquire(
        &self,
        tenant: &TenantId,
        site: &SiteId,
        deployment_id: &DeploymentId,
    ) -> Result<SiteLockGuard, PipelineError> {
        let key = ReleaseLayout::new(tenant, site).lock_key();
        let label = format!("{tenant}/{site}");
        let mut waiting = false;

        loop {
            let info = LockInfo::new(label.clone(), Some(deployment_id.clone()));
            let body = serde_json::to_vec(&info)
                .map_err(|e| PipelineError::Internal(format!("failed to encode lock: {e}")))?;

            match self
                .store
                .put_object(&key, Bytes::from(body), &PutOptions::immutable("application/json", NO_CACHE))
                .await
            {
                Ok(_) => {
                    tracing::debug!(site = %label, deployment = %deployment_id, "site lock acquired");
                    return Ok(SiteLockGuard {
                        store: Arc::clone(&self.store),
                        key,
                        info,
                        released: false,
                    });
                }
                Err(StoreError::ImmutableObject { .. }) => {}
                Err(e) => return Err(e.into()),
            }

            match self.existing(&key).await? {
                Existing::Gone => continue,
                Existing::Unreadable => {
                    tracing::warn!(site = %label, "lock info unreadable, breaking lock");
                    self.store.delete_prefix(&key).await?;
                }
                Existing::Held(holder) if holder.is_stale() => {
                    tracing::warn!(
                        site = %label,
                        "auto-breaking stale lock held by {}",
                        holder
                    );
                    self.store.delete_prefix(&key).await?;
                }
                Existing::Held(holder) => match self.policy {
                    LockPolicy::Reject => {
                        return Err(PipelineError::PublishInProgress {
                            site: label,
                            holder,
                        });
                    }
                    LockPolicy::Queue => {
                        if !waiting {
                            tracing::info!(site = %label, "waiting for publish by {} to finish", holder);
                            waiting = true;
                        }
                        tokio::time::sleep(QUEUE_POLL_INTERVAL).await;
                    }
                },
            }
        }
    }

    async fn existing(&self, key: &str) -> Result<Existing, PipelineError> {
        match self.store.get_object(key).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)
                .map(Existing::Held)
                .unwrap_or(Existing::Unreadable)),
            Err(StoreError::NotFound(_)) => Ok(Existing::Gone),
            Err(e) => Err(e.into()),
        }
    }

    /// Current holder of a site's lock, if any.
    pub async fn holder(
        &self,
        tenant: &TenantId,
        site: &SiteId,
    ) -> Result<Option<LockInfo>, PipelineError> {
        let key = ReleaseLayout::new(tenant, site).lock_key();
        Ok(match self.existing(&key).await? {
            Existing::Held(info) => Some(info),
            Existing::Unreadable | Existing::Gone => None,
        })
    }
}

/// A held site lock.
pub struct SiteLockGuard {
    store: Arc<dyn ArtifactStore>,
    key: String,
    info: LockInfo,
    released: bool,
}

impl SiteLockGuard {
    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Remove the lock object.
    pub async fn release(mut self) {
        self.released = true;
        release_lock(self.store.as_ref(), &self.key, &self.info).await;
    }
}

/// Delete the lock at `key` if `info` still describes it.
async fn release_lock(store: &dyn ArtifactStore, key: &str, info: &LockInfo) {
    let ours = match store.get_object(key).await {
        Ok(raw) => serde_json::from_slice::<LockInfo>(&raw)
            .is_ok_and(|current| current.deployment_id == info.deployment_id),
        Err(StoreError::NotFound(_)) => false,
        Err(e) => {
            tracing::warn!(site = %info.site, "could not read lock before release: {}", e);
            false
        }
    };
    if !ours {
        tracing::debug!(site = %info.site, "site lock already taken over, leaving it");
        return;
    }
    match store.delete_prefix(key).await {
        Ok(_) => tracing::debug!(site = %info.site, "site lock released"),
        Err(e) => tracing::warn!(site = %info.site, "failed to release site lock: {}", e),
    }
}

impl fmt::Debug for SiteLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteLockGuard")
            .field("site", &self.info.site)
            .finish()
    }
}

impl Drop for SiteLockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let (store, key, info) = (
            Arc::clone(&self.store),
            std::mem::take(&mut self.key),
            self.info.clone(),
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { release_lock(store.as_ref(), &key, &info).await });
            }
            Err(_) => {
                tracing::warn!(site = %info.site, "no runtime to release site lock; it will go stale");
            }
        }
    }
}
