// ABOUTME: Rollback command implementation.
// ABOUTME: Points a site's alias back at an earlier stored release.

use super::App;
use sitepub::error::{Error, Result};
use sitepub::output::Output;
use sitepub::store::AliasSlot;
use sitepub::types::ReleaseHash;

pub async fn rollback(
    app: &App,
    site: &str,
    tenant: Option<&str>,
    to: &str,
    preview: bool,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let (tenant, site) = app.site_ids(site, tenant)?;
    let release = ReleaseHash::parse(to).map_err(|e| Error::InvalidArgument(e.to_string()))?;
    let slot = if preview {
        AliasSlot::Preview
    } else {
        AliasSlot::Live
    };

    output.progress(&format!(
        "Rolling back {tenant}/{site} {} to {}",
        slot.as_str(),
        release.short()
    ));
    let outcome = app
        .pipeline
        .rollback_site(&tenant, &site, release.as_str(), slot)
        .await?;

    for warning in outcome.diagnostics.warnings() {
        output.warning(&warning.message);
    }
    let mut lines = vec![format!("alias: {} → {}", outcome.activation.alias_key, outcome.activation.target)];
    if let Some(previous) = &outcome.activation.previous_target {
        lines.push(format!("was: {previous}"));
    }
    output.result("Rollback complete!", &lines, &outcome);
    Ok(())
}
