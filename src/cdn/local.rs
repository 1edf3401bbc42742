// ABOUTME: CDN provider for local and test setups with no edge cache.
// ABOUTME: Records every call so purges and rules can be inspected.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{CachingRule, CdnError, CdnProvider, PreviewOptions, PurgeResult};
use crate::types::ReleaseHash;

/// A call received by [`LocalCdn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdnCall {
    PurgeUrls(Vec<String>),
    PurgeTags(Vec<String>),
    PurgePrefix(String),
    PurgeAll,
    CachingRules(Vec<CachingRule>),
}

/// Origin-only "CDN": nothing is cached, so purges trivially succeed.
#[derive(Debug, Default)]
pub struct LocalCdn {
    base_url: Option<String>,
    calls: Mutex<Vec<CdnCall>>,
    reject_purges: AtomicBool,
    reject_previews: AtomicBool,
}

impl LocalCdn {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            base_url,
            calls: Mutex::new(Vec::new()),
            reject_purges: AtomicBool::new(false),
            reject_previews: AtomicBool::new(false),
        }
    }

    /// A CDN whose purges are all rejected.
    pub fn failing() -> Self {
        let cdn = Self::default();
        cdn.set_reject_purges(true);
        cdn
    }

    /// Make subsequent purges fail (they are still recorded).
    pub fn set_reject_purges(&self, reject: bool) {
        self.reject_purges.store(reject, Ordering::SeqCst);
    }

    /// Make subsequent preview URL requests fail.
    pub fn set_reject_previews(&self, reject: bool) {
        self.reject_previews.store(reject, Ordering::SeqCst);
    }

    /// Calls received so far, oldest first.
    pub fn calls(&self) -> Vec<CdnCall> {
        self.calls.lock().clone()
    }

    /// Tag sets of every tag purge, oldest first.
    pub fn purged_tags(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                CdnCall::PurgeTags(tags) => Some(tags.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: CdnCall) {
        tracing::debug!(?call, "cdn call");
        self.calls.lock().push(call);
    }

    fn purge(&self, call: CdnCall, count: u64) -> Result<PurgeResult, CdnError> {
        self.record(call);
        if self.reject_purges.load(Ordering::SeqCst) {
            return Err(CdnError::Request("purge rejected".to_string()));
        }
        Ok(PurgeResult::succeeded(count))
    }
}

#[async_trait]
impl CdnProvider for LocalCdn {
    async fn purge_urls(&self, urls: &[String]) -> Result<PurgeResult, CdnError> {
        self.purge(CdnCall::PurgeUrls(urls.to_vec()), urls.len() as u64)
    }

    async fn purge_by_tag(&self, tags: &[String]) -> Result<PurgeResult, CdnError> {
        self.purge(CdnCall::PurgeTags(tags.to_vec()), tags.len() as u64)
    }

    async fn purge_by_prefix(&self, prefix: &str) -> Result<PurgeResult, CdnError> {
        self.purge(CdnCall::PurgePrefix(prefix.to_string()), 1)
    }

    async fn purge_all(&self) -> Result<PurgeResult, CdnError> {
        self.purge(CdnCall::PurgeAll, 1)
    }

    async fn create_preview_url(
        &self,
        origin_url: &str,
        release: &ReleaseHash,
        _opts: &PreviewOptions,
    ) -> Result<String, CdnError> {
        if self.reject_previews.load(Ordering::SeqCst) {
            return Err(CdnError::Request("preview URL rejected".to_string()));
        }
        Ok(match &self.base_url {
            Some(base) => format!("{}/__preview/{}", base.trim_end_matches('/'), release),
            None => origin_url.trim_end_matches('/').to_string(),
        })
    }

    async fn set_caching_rules(&self, rules: &[CachingRule]) -> Result<(), CdnError> {
        self.record(CdnCall::CachingRules(rules.to_vec()));
        Ok(())
    }

    async fn validate_configuration(&self) -> Result<bool, CdnError> {
        Ok(self
            .base_url
            .as_deref()
            .is_none_or(|base| base.starts_with("http://") || base.starts_with("https://")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_purges_in_order() {
        let cdn = LocalCdn::default();
        cdn.purge_by_tag(&["site:s1".to_string()]).await.unwrap();
        cdn.purge_all().await.unwrap();

        assert_eq!(
            cdn.calls(),
            vec![
                CdnCall::PurgeTags(vec!["site:s1".to_string()]),
                CdnCall::PurgeAll
            ]
        );
        assert_eq!(cdn.purged_tags(), vec![vec!["site:s1".to_string()]]);
    }

    #[tokio::test]
    async fn failing_cdn_records_then_rejects() {
        let cdn = LocalCdn::failing();
        assert!(cdn.purge_all().await.is_err());
        assert_eq!(cdn.calls(), vec![CdnCall::PurgeAll]);
    }

    #[tokio::test]
    async fn preview_url_uses_base_when_configured() {
        let hash = ReleaseHash::digest(b"x");
        let cdn = LocalCdn::new(Some("https://cdn.test/".to_string()));
        let url = cdn
            .create_preview_url("http://origin/r/", &hash, &PreviewOptions::default())
            .await
            .unwrap();
        assert_eq!(url, format!("https://cdn.test/__preview/{hash}"));

        let bare = LocalCdn::default();
        let url = bare
            .create_preview_url("http://origin/r/", &hash, &PreviewOptions::default())
            .await
            .unwrap();
        assert_eq!(url, "http://origin/r");
    }

    #[tokio::test]
    async fn validates_base_url_scheme() {
        assert!(LocalCdn::default().validate_configuration().await.unwrap());
        assert!(
            !LocalCdn::new(Some("ftp://x".to_string()))
                .validate_configuration()
                .await
                .unwrap()
        );
    }
}
