// ABOUTME: Restores a site's alias to an earlier release and purges its cache.
// ABOUTME: Used by automatic rollback after a failed activation and by manual rollbacks.

use serde::Serialize;
use std::time::Duration;

use crate::cdn::{CdnProvider, site_tags};
use crate::diagnostics::{Diagnostics, Warning};
use crate::store::{AliasSlot, ArtifactStore, ReleaseLayout};

use super::PipelineError;
use super::activation::switch_alias;
use super::checks::purge_tags;
use super::context::ActivationResult;

/// Result of a manual rollback.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackOutcome {
    pub activation: ActivationResult,
    pub diagnostics: Diagnostics,
}

/// Point the alias back at `release` and purge site caches.
pub(crate) async fn restore_release(
    store: &dyn ArtifactStore,
    cdn: &dyn CdnProvider,
    layout: &ReleaseLayout,
    slot: AliasSlot,
    release: &str,
    purge_timeout: Duration,
    diagnostics: &mut Diagnostics,
) -> Result<ActivationResult, PipelineError> {
    let activation = switch_alias(store, layout, slot, release).await?;

    let tags = site_tags(layout.tenant().as_str(), layout.site().as_str());
    let purged = purge_tags(cdn, &tags, purge_timeout, diagnostics).await;
    if purged.is_none_or(|result| !result.success) {
        diagnostics.warn(Warning::rollback(format!(
            "{} restored to {} but its cache was not purged; the failed release may be served until it expires",
            activation.alias_key, activation.target
        )));
    }

    tracing::info!(
        alias = %activation.alias_key,
        target = %activation.target,
        "rolled back"
    );
    Ok(activation)
}
