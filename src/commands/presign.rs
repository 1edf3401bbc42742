// ABOUTME: Presign command implementation.
// ABOUTME: Issues time-limited upload or download URLs for store objects.

use super::App;
use sitepub::error::Result;
use sitepub::output::Output;
use sitepub::store::validate_key;
use std::time::Duration;

pub async fn presign(app: &App, key: &str, put: bool, expires: Duration, output: Output) -> Result<()> {
    validate_key(key)?;
    let url = if put {
        app.store.presign_put(key, expires).await?
    } else {
        app.store.presign_get(key, expires).await?
    };

    output.result(
        &format!("Presigned {} for {key}", url.method.as_str()),
        &[url.url.clone(), format!("expires {}", url.expires_at.to_rfc3339())],
        &url,
    );
    Ok(())
}
