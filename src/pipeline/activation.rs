// ABOUTME: Blue/green alias switch for a site's serving slot.
// ABOUTME: Remembers the previous alias value so the switch can be reverted.

use chrono::Utc;

use crate::store::{AliasSlot, ArtifactStore, ReleaseLayout, StoreError};

use super::PipelineError;
use super::context::ActivationResult;

/// Current alias target of a slot, or `None` if it was never set.
pub(crate) async fn current_target(
    store: &dyn ArtifactStore,
    alias_key: &str,
) -> Result<Option<String>, PipelineError> {
    match store.get_alias(alias_key).await {
        Ok(target) => Ok(Some(target)),
        Err(StoreError::AliasNotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Point `slot` at `release`. The release manifest must already be stored.
pub(crate) async fn activate(
    store: &dyn ArtifactStore,
    layout: &ReleaseLayout,
    slot: AliasSlot,
    release: &str,
) -> Result<ActivationResult, PipelineError> {
    if !store.exists(&layout.manifest_key(release)).await? {
        return Err(PipelineError::Internal(format!(
            "refusing to activate incomplete release {release}: manifest missing"
        )));
    }
    switch_alias(store, layout, slot, release).await
}

/// Point `slot` at `release` without checking the release exists.
pub(crate) async fn switch_alias(
    store: &dyn ArtifactStore,
    layout: &ReleaseLayout,
    slot: AliasSlot,
    release: &str,
) -> Result<ActivationResult, PipelineError> {
    let alias_key = layout.alias_key(slot);
    let previous_target = current_target(store, &alias_key).await?;
    let target = ReleaseLayout::alias_target(release);

    store.set_alias(&alias_key, &target).await?;

    tracing::info!(
        alias = %alias_key,
        target = %target,
        previous = previous_target.as_deref().unwrap_or("<none>"),
        "alias switched"
    );

    Ok(ActivationResult {
        alias_key,
        target,
        previous_target,
        activated_at: Utc::now(),
    })
}
