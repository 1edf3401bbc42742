// ABOUTME: Immutable upload of a packaged release, manifest last.
// ABOUTME: Reuses objects already stored with identical content; differing content is a violation.

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;

use crate::store::{ArtifactStore, PutOptions, ReleaseLayout, StoreError};

use super::PipelineError;
use super::manifest::ArtifactManifest;
use super::package::{NO_CACHE, PackagedFile};
use super::retry::RetryPolicy;

/// What the upload step did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    /// Objects written by this run.
    pub uploaded: usize,
    /// Objects already present with identical content.
    pub reused: usize,
    pub bytes_uploaded: u64,
    /// The whole release was already complete in the store.
    pub release_existed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Written {
    Uploaded,
    Reused,
}

/// Upload every packaged file, then the manifest.
pub(crate) async fn upload_release(
    store: &dyn ArtifactStore,
    layout: &ReleaseLayout,
    manifest: &ArtifactManifest,
    files: &[PackagedFile],
    retry: &RetryPolicy,
    concurrency: usize,
) -> Result<UploadReport, PipelineError> {
    let release = &manifest.release_hash;
    let manifest_key = layout.manifest_key(release.as_str());

    // The manifest is written last, so its presence means the release is complete.
    if store.exists(&manifest_key).await? {
        tracing::info!(release = %release.short(), "release already uploaded, skipping");
        return Ok(UploadReport {
            reused: files.len(),
            release_existed: true,
            ..UploadReport::default()
        });
    }

    let uploads: Vec<_> = files
        .iter()
        .map(|file| async move {
            let key = layout.object_key(release, &file.entry.path);
            let opts = PutOptions::immutable(&file.entry.content_type, &file.entry.cache_control);
            let written = retry
                .run("upload", || {
                    put_once(store, &key, &file.body, &file.entry.content_hash, &opts)
                })
                .await?;
            Ok::<_, PipelineError>((written, file.entry.size))
        })
        .collect();
    let outcomes: Vec<(Written, u64)> = futures::stream::iter(uploads)
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await?;

    let mut report = UploadReport::default();
    for (written, size) in outcomes {
        match written {
            Written::Uploaded => {
                report.uploaded += 1;
                report.bytes_uploaded += size;
            }
            Written::Reused => report.reused += 1,
        }
    }

    let manifest_body = Bytes::from(manifest.to_json_bytes()?);
    let wrote = retry
        .run("upload manifest", || {
            write_manifest(store, &manifest_key, manifest, &manifest_body)
        })
        .await?;
    report.release_existed = !wrote;

    tracing::info!(
        release = %release.short(),
        uploaded = report.uploaded,
        reused = report.reused,
        bytes = report.bytes_uploaded,
        "release uploaded"
    );
    Ok(report)
}

/// Write the manifest. Returns `false` when another run already completed the
/// same release; its manifest differs only in build metadata.
async fn write_manifest(
    store: &dyn ArtifactStore,
    key: &str,
    manifest: &ArtifactManifest,
    body: &Bytes,
) -> Result<bool, PipelineError> {
    let opts = PutOptions::immutable("application/json", NO_CACHE);
    match store.put_object(key, body.clone(), &opts).await {
        Ok(_) => Ok(true),
        Err(StoreError::ImmutableObject { .. }) => {
            let stored = store.get_object(key).await?;
            let same_release = ArtifactManifest::from_json_bytes(&stored).is_ok_and(|other| {
                other.release_hash == manifest.release_hash && other.integrity == manifest.integrity
            });
            if !same_release {
                return Err(PipelineError::ImmutabilityViolation {
                    key: key.to_string(),
                });
            }
            tracing::info!(
                release = %manifest.release_hash.short(),
                "release completed concurrently by another run"
            );
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Write one object unless identical content is already stored at `key`.
async fn put_once(
    store: &dyn ArtifactStore,
    key: &str,
    body: &Bytes,
    content_hash: &str,
    opts: &PutOptions,
) -> Result<Written, PipelineError> {
    if let Some(written) = existing(store, key, content_hash).await? {
        return Ok(written);
    }

    match store.put_object(key, body.clone(), opts).await {
        Ok(_) => Ok(Written::Uploaded),
        // Lost a race with another writer; fine if it wrote the same bytes.
        Err(StoreError::ImmutableObject { .. }) => existing(store, key, content_hash)
            .await?
            .ok_or_else(|| PipelineError::ImmutabilityViolation {
                key: key.to_string(),
            }),
        Err(e) => Err(e.into()),
    }
}

async fn existing(
    store: &dyn ArtifactStore,
    key: &str,
    content_hash: &str,
) -> Result<Option<Written>, PipelineError> {
    match store.head_object(key).await {
        Ok(head) if head.etag == content_hash => {
            tracing::debug!(key, "identical object already stored");
            Ok(Some(Written::Reused))
        }
        Ok(_) => Err(PipelineError::ImmutabilityViolation {
            key: key.to_string(),
        }),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
