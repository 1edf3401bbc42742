// ABOUTME: Post-activation warm and verify steps.
// ABOUTME: Warm is best-effort and only warns; verify failures are fatal.

use futures::future::join_all;
use serde::Serialize;
use std::time::Duration;

use crate::cdn::{CdnProvider, PurgeResult};
use crate::diagnostics::{Diagnostics, Warning};
use crate::probe::{HttpProber, is_success};

use super::PipelineError;
use super::retry::RetryPolicy;

/// Join a base URL and a route path.
pub fn route_url(base: &str, route: &str) -> String {
    let base = base.trim_end_matches('/');
    if route.is_empty() || route == "/" {
        format!("{base}/")
    } else if route.starts_with('/') {
        format!("{base}{route}")
    } else {
        format!("{base}/{route}")
    }
}

/// Purge by tags within `timeout`, turning every failure into a warning.
pub(crate) async fn purge_tags(
    cdn: &dyn CdnProvider,
    tags: &[String],
    timeout: Duration,
    diagnostics: &mut Diagnostics,
) -> Option<PurgeResult> {
    match tokio::time::timeout(timeout, cdn.purge_by_tag(tags)).await {
        Ok(Ok(result)) if result.success => Some(result),
        Ok(Ok(result)) => {
            diagnostics.warn(Warning::cdn_purge(format!(
                "CDN purge of {} reported failure: {}",
                tags.join(","),
                result.errors.join("; ")
            )));
            Some(result)
        }
        Ok(Err(e)) => {
            diagnostics.warn(Warning::cdn_purge(format!(
                "CDN purge of {} failed: {e}",
                tags.join(",")
            )));
            None
        }
        Err(_) => {
            diagnostics.warn(Warning::cdn_purge(format!(
                "CDN purge of {} timed out after {timeout:?}",
                tags.join(",")
            )));
            None
        }
    }
}

/// Critical routes fetched after activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmSettings {
    pub routes: Vec<String>,
    /// Per-route request timeout.
    pub timeout: Duration,
    pub purge_timeout: Duration,
}

impl Default for WarmSettings {
    fn default() -> Self {
        Self {
            routes: default_warm_routes(),
            timeout: Duration::from_secs(5),
            purge_timeout: Duration::from_secs(30),
        }
    }
}

pub fn default_warm_routes() -> Vec<String> {
    ["/", "/sitemap.xml", "/robots.txt", "/.well-known/actions.json"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Checks a release must pass before it is announced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifySettings {
    pub health_path: String,
    pub check_sitemap: bool,
    pub timeout: Duration,
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            health_path: "/".to_string(),
            check_sitemap: true,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of warming.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    pub warmed: Vec<String>,
    pub failed: Vec<String>,
}

/// Purge the CDN, then fetch every critical route concurrently.
pub(crate) async fn warm(
    cdn: &dyn CdnProvider,
    prober: &dyn HttpProber,
    base_url: &str,
    tags: &[String],
    settings: &WarmSettings,
    diagnostics: &mut Diagnostics,
) -> WarmReport {
    purge_tags(cdn, tags, settings.purge_timeout, diagnostics).await;

    let requests = settings.routes.iter().map(|route| {
        let url = route_url(base_url, route);
        async move {
            let outcome = prober.get(&url, settings.timeout).await;
            (url, outcome)
        }
    });

    let mut report = WarmReport::default();
    for (url, outcome) in join_all(requests).await {
        match outcome {
            Ok(status) if is_success(status) => {
                tracing::debug!(%url, status, "warmed");
                report.warmed.push(url);
            }
            Ok(status) => {
                diagnostics.warn(Warning::warm_route(format!(
                    "warming {url} returned HTTP {status}"
                )));
                report.failed.push(url);
            }
            Err(e) => {
                diagnostics.warn(Warning::warm_route(format!("warming {url} failed: {e}")));
                report.failed.push(url);
            }
        }
    }
    report
}

/// GET `url` and require a 2xx, retrying per policy.
async fn check(
    prober: &dyn HttpProber,
    check: &'static str,
    url: &str,
    timeout: Duration,
    retry: &RetryPolicy,
) -> Result<(), PipelineError> {
    retry
        .run(check, || async {
            let status = prober.get(url, timeout).await?;
            if is_success(status) {
                Ok(())
            } else {
                Err(PipelineError::VerificationFailed {
                    check,
                    url: url.to_string(),
                    status,
                })
            }
        })
        .await?;
    tracing::info!(check, %url, "check passed");
    Ok(())
}

/// Liveness of the health path, then reachability of the sitemap.
pub(crate) async fn verify(
    prober: &dyn HttpProber,
    base_url: &str,
    settings: &VerifySettings,
    retry: &RetryPolicy,
) -> Result<(), PipelineError> {
    let health = route_url(base_url, &settings.health_path);
    check(prober, "liveness", &health, settings.timeout, retry).await?;
    if settings.check_sitemap {
        let sitemap = route_url(base_url, "/sitemap.xml");
        check(prober, "sitemap", &sitemap, settings.timeout, retry).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdn::LocalCdn;
    use crate::probe::ProbeError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Answers from a fixed table; unknown URLs fail to connect.
    #[derive(Default)]
    struct TableProber {
        statuses: HashMap<String, u16>,
        seen: Mutex<Vec<String>>,
    }

    impl TableProber {
        fn with(entries: &[(&str, u16)]) -> Self {
            Self {
                statuses: entries.iter().map(|(u, s)| (u.to_string(), *s)).collect(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpProber for TableProber {
        async fn get(&self, url: &str, _timeout: Duration) -> Result<u16, ProbeError> {
            self.seen.lock().push(url.to_string());
            self.statuses
                .get(url)
                .copied()
                .ok_or_else(|| ProbeError::Transport {
                    url: url.to_string(),
                    reason: "connection refused".to_string(),
                })
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn route_urls_join_cleanly() {
        assert_eq!(route_url("http://x/", "/"), "http://x/");
        assert_eq!(route_url("http://x", "/robots.txt"), "http://x/robots.txt");
        assert_eq!(route_url("http://x/", "sitemap.xml"), "http://x/sitemap.xml");
    }

    #[tokio::test]
    async fn warm_failures_only_warn() {
        let cdn = LocalCdn::default();
        let prober = TableProber::with(&[("http://site/", 200), ("http://site/robots.txt", 500)]);
        let mut diag = Diagnostics::default();

        let report = warm(
            &cdn,
            &prober,
            "http://site",
            &["site:s1".to_string()],
            &WarmSettings {
                routes: vec!["/".to_string(), "/robots.txt".to_string(), "/missing".to_string()],
                timeout: Duration::from_secs(1),
                purge_timeout: Duration::from_secs(1),
            },
            &mut diag,
        )
        .await;

        assert_eq!(report.warmed, vec!["http://site/"]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(diag.warnings().len(), 2);
        assert_eq!(cdn.purged_tags(), vec![vec!["site:s1".to_string()]]);
    }

    #[tokio::test]
    async fn verify_requires_liveness_and_sitemap() {
        let healthy = TableProber::with(&[("http://site/", 200), ("http://site/sitemap.xml", 200)]);
        assert!(
            verify(&healthy, "http://site", &VerifySettings::default(), &fast_retry())
                .await
                .is_ok()
        );

        let no_sitemap = TableProber::with(&[("http://site/", 200), ("http://site/sitemap.xml", 404)]);
        let err = verify(&no_sitemap, "http://site", &VerifySettings::default(), &fast_retry())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::VerificationFailed { check: "sitemap", status: 404, .. }
        ));
        // Retried once before giving up.
        assert_eq!(no_sitemap.seen.lock().len(), 3);
    }
}
