// ABOUTME: Release inventory and pruning of old releases.
// ABOUTME: Releases referenced by an alias are never pruned.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::store::{AliasSlot, ArtifactStore, MANIFEST_FILE, ReleaseLayout};
use crate::types::{SiteId, TenantId};

use super::PipelineError;
use super::activation::current_target;
use super::lock::LockInfo;

/// What a site is serving and what it has stored.
#[derive(Debug, Clone, Serialize)]
pub struct SiteStatus {
    pub tenant: TenantId,
    pub site: SiteId,
    pub aliases: BTreeMap<AliasSlot, String>,
    pub releases: Vec<ReleaseSummary>,
    /// Publish currently running in this process.
    pub lock: Option<LockInfo>,
}

/// One stored release of a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseSummary {
    pub release: String,
    pub objects: usize,
    pub bytes: u64,
    /// Newest object write in the release.
    pub last_modified: DateTime<Utc>,
    /// The manifest is present, so the upload completed.
    pub complete: bool,
}

/// Stored releases of a site, newest first.
pub async fn list_releases(
    store: &dyn ArtifactStore,
    layout: &ReleaseLayout,
) -> Result<Vec<ReleaseSummary>, PipelineError> {
    let objects = store.list_objects(&layout.releases_prefix()).await?;

    let mut releases: BTreeMap<String, ReleaseSummary> = BTreeMap::new();
    for object in &objects {
        let Some(release) = layout.release_of_key(&object.key) else {
            continue;
        };
        let summary = releases
            .entry(release.to_string())
            .or_insert_with(|| ReleaseSummary {
                release: release.to_string(),
                objects: 0,
                bytes: 0,
                last_modified: object.last_modified,
                complete: false,
            });
        summary.objects += 1;
        summary.bytes += object.size;
        summary.last_modified = summary.last_modified.max(object.last_modified);
        if object.key.ends_with(&format!("/{MANIFEST_FILE}")) {
            summary.complete = true;
        }
    }

    let mut releases: Vec<_> = releases.into_values().collect();
    releases.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.release.cmp(&b.release))
    });
    Ok(releases)
}

/// Releases currently referenced by the site's aliases.
pub async fn aliased_releases(
    store: &dyn ArtifactStore,
    layout: &ReleaseLayout,
) -> Result<BTreeMap<AliasSlot, String>, PipelineError> {
    let mut aliased = BTreeMap::new();
    for slot in [AliasSlot::Live, AliasSlot::Preview] {
        if let Some(target) = current_target(store, &layout.alias_key(slot)).await?
            && let Some(release) = ReleaseLayout::release_from_target(&target)
        {
            aliased.insert(slot, release.to_string());
        }
    }
    Ok(aliased)
}

/// What pruning removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub removed: Vec<String>,
    pub kept: Vec<String>,
    pub objects_deleted: usize,
}

/// Delete all but the newest `keep` releases, sparing aliased ones.
pub async fn prune_releases(
    store: &dyn ArtifactStore,
    layout: &ReleaseLayout,
    keep: usize,
    dry_run: bool,
) -> Result<PruneReport, PipelineError> {
    let protected: HashSet<String> = aliased_releases(store, layout)
        .await?
        .into_values()
        .collect();
    let releases = list_releases(store, layout).await?;

    let mut report = PruneReport::default();
    for (index, summary) in releases.into_iter().enumerate() {
        if index < keep || protected.contains(&summary.release) {
            report.kept.push(summary.release);
            continue;
        }
        if !dry_run {
            report.objects_deleted += store
                .delete_prefix(&layout.release_prefix(&summary.release))
                .await?;
        }
        tracing::info!(release = %summary.release, dry_run, "pruned release");
        report.removed.push(summary.release);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, PutOptions};
    use crate::types::{ReleaseHash, SiteId, TenantId};
    use bytes::Bytes;

    fn layout() -> ReleaseLayout {
        ReleaseLayout::new(&TenantId::parse("t1").unwrap(), &SiteId::parse("s1").unwrap())
    }

    async fn put_release(store: &MemoryStore, layout: &ReleaseLayout, seed: &[u8]) -> ReleaseHash {
        let hash = ReleaseHash::digest(seed);
        for path in ["index.html", MANIFEST_FILE] {
            store
                .put_object(
                    &layout.object_key(&hash, path),
                    Bytes::from_static(b"x"),
                    &PutOptions::default(),
                )
                .await
                .unwrap();
        }
        // Distinct modification times.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        hash
    }

    #[tokio::test]
    async fn lists_releases_newest_first() {
        let store = MemoryStore::default();
        let layout = layout();
        let old = put_release(&store, &layout, b"old").await;
        let new = put_release(&store, &layout, b"new").await;

        let releases = list_releases(&store, &layout).await.unwrap();
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].release, new.as_str());
        assert_eq!(releases[1].release, old.as_str());
        assert!(releases.iter().all(|r| r.complete && r.objects == 2));
    }

    #[tokio::test]
    async fn prune_keeps_newest_and_aliased_releases() {
        let store = MemoryStore::default();
        let layout = layout();
        let live = put_release(&store, &layout, b"a").await;
        let middle = put_release(&store, &layout, b"b").await;
        let newest = put_release(&store, &layout, b"c").await;
        store
            .set_alias(
                &layout.alias_key(AliasSlot::Live),
                &ReleaseLayout::alias_target(live.as_str()),
            )
            .await
            .unwrap();

        let preview = prune_releases(&store, &layout, 1, true).await.unwrap();
        assert_eq!(preview.removed, vec![middle.as_str().to_string()]);
        assert_eq!(preview.objects_deleted, 0);

        let report = prune_releases(&store, &layout, 1, false).await.unwrap();
        assert_eq!(report.removed, vec![middle.as_str().to_string()]);
        assert_eq!(report.objects_deleted, 2);
        assert!(report.kept.contains(&newest.as_str().to_string()));
        assert!(report.kept.contains(&live.as_str().to_string()));
        assert_eq!(list_releases(&store, &layout).await.unwrap().len(), 2);
    }
}
