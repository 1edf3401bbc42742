// ABOUTME: Prune command implementation.
// ABOUTME: Deletes old releases while keeping the newest and every aliased one.

use super::App;
use sitepub::error::Result;
use sitepub::output::Output;

pub async fn prune(
    app: &App,
    site: &str,
    tenant: Option<&str>,
    keep: usize,
    dry_run: bool,
    output: Output,
) -> Result<()> {
    let (tenant, site) = app.site_ids(site, tenant)?;
    let report = app.pipeline.prune(&tenant, &site, keep, dry_run).await?;

    let verb = if dry_run { "would remove" } else { "removed" };
    let mut lines: Vec<String> = report
        .removed
        .iter()
        .map(|release| format!("{verb} {release}"))
        .collect();
    lines.push(format!(
        "kept {} release(s), deleted {} object(s)",
        report.kept.len(),
        report.objects_deleted
    ));

    output.result(&format!("Pruned {tenant}/{site}"), &lines, &report);
    Ok(())
}
