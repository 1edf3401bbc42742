// ABOUTME: Status command implementation.
// ABOUTME: Shows what a site serves, what it has stored, and any publish in progress.

use super::App;
use sitepub::error::Result;
use sitepub::output::Output;

pub async fn status(app: &App, site: &str, tenant: Option<&str>, output: Output) -> Result<()> {
    let (tenant, site) = app.site_ids(site, tenant)?;
    let status = app.pipeline.site_status(&tenant, &site).await?;

    let mut lines: Vec<String> = status
        .aliases
        .iter()
        .map(|(slot, release)| format!("{}: {release}", slot.as_str()))
        .collect();
    if status.aliases.is_empty() {
        lines.push("never published".to_string());
    }
    for release in &status.releases {
        lines.push(format!(
            "release {} {} objects, {} bytes, {}{}",
            release.release,
            release.objects,
            release.bytes,
            release.last_modified.format("%Y-%m-%d %H:%M:%S"),
            if release.complete { "" } else { " (incomplete)" }
        ));
    }
    if let Some(lock) = &status.lock {
        lines.push(format!("publish in progress: {lock}"));
    }

    output.result(&format!("Site {tenant}/{site}"), &lines, &status);
    Ok(())
}
