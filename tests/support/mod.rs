// ABOUTME: Test support utilities.
// ABOUTME: Scripted prober, failure-injecting store and bus, and a ready-wired pipeline harness.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use sitepub::build::NoopBuilder;
use sitepub::cdn::LocalCdn;
use sitepub::contract::{Page, Site, SiteCatalog};
use sitepub::events::{BroadcastBus, EventBus, EventError, PipelineEvent};
use sitepub::pipeline::{
    Collaborators, DeploymentIntent, Pipeline, PipelineSettings, PublishRequest, RetryPolicy,
    VerifySettings, WarmSettings,
};
use sitepub::probe::{HttpProber, ProbeError};
use sitepub::store::{
    ArtifactStore, MemoryStore, ObjectHead, ObjectSummary, PresignedUrl, PutOptions, PutResult,
    StoreError, is_release_scoped,
};
use sitepub::types::{SiteId, TenantId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("sitepub=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// The site most tests publish: `t1/s1`.
#[allow(dead_code)]
pub fn site() -> Site {
    Site {
        id: SiteId::parse("s1").unwrap(),
        tenant_id: TenantId::parse("t1").unwrap(),
        name: "Site One".to_string(),
        base_url: "http://s1.test".to_string(),
        publishable: true,
        pages: vec![
            Page {
                path: "/".to_string(),
                title: Some("Home".to_string()),
            },
            Page {
                path: "/about".to_string(),
                title: None,
            },
        ],
        actions: Vec::new(),
        build_dir: None,
    }
}

#[allow(dead_code)]
pub fn request(intent: DeploymentIntent) -> PublishRequest {
    PublishRequest::new(
        SiteId::parse("s1").unwrap(),
        TenantId::parse("t1").unwrap(),
        intent,
    )
}

/// Settings with millisecond backoff so failing checks stay fast.
#[allow(dead_code)]
pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        warm: WarmSettings {
            timeout: Duration::from_millis(200),
            purge_timeout: Duration::from_millis(200),
            ..WarmSettings::default()
        },
        verify: VerifySettings {
            timeout: Duration::from_millis(200),
            ..VerifySettings::default()
        },
        retry: RetryPolicy {
            attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        },
        ..PipelineSettings::default()
    }
}

/// Answers 200 unless a route was scripted otherwise.
#[derive(Default)]
pub struct ScriptedProber {
    routes: Mutex<HashMap<String, u16>>,
    delay: Mutex<Duration>,
    calls: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedProber {
    /// Make requests for `path` (e.g. `/robots.txt`) return `status`.
    pub fn respond(&self, path: &str, status: u16) {
        self.routes.lock().insert(path.to_string(), status);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

fn path_of(url: &str) -> String {
    url.splitn(4, '/')
        .nth(3)
        .map(|rest| format!("/{rest}"))
        .unwrap_or_else(|| "/".to_string())
}

#[async_trait]
impl HttpProber for ScriptedProber {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<u16, ProbeError> {
        self.calls.lock().push(url.to_string());
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let path = path_of(url);
        let status = self
            .routes
            .lock()
            .iter()
            .find(|(route, _)| path == **route || (route.as_str() != "/" && path.ends_with(route.as_str())))
            .map(|(_, status)| *status)
            .unwrap_or(200);
        Ok(status)
    }
}

/// Memory store whose first `n` release object writes fail with a transient
/// backend error, and whose alias writes can be made to fail after a count.
pub struct FlakyStore {
    inner: MemoryStore,
    failures_left: AtomicUsize,
    alias_writes_left: AtomicUsize,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn failing_first(n: usize) -> Self {
        Self {
            inner: MemoryStore::default(),
            failures_left: AtomicUsize::new(n),
            alias_writes_left: AtomicUsize::new(usize::MAX),
        }
    }

    /// Alias writes succeed `n` times, then fail.
    pub fn failing_alias_writes_after(n: usize) -> Self {
        Self {
            alias_writes_left: AtomicUsize::new(n),
            ..Self::failing_first(0)
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

#[async_trait]
impl ArtifactStore for FlakyStore {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        opts: &PutOptions,
    ) -> Result<PutResult, StoreError> {
        let injected = is_release_scoped(key)
            && self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if injected {
            return Err(StoreError::Backend("503 slow down".to_string()));
        }
        self.inner.put_object(key, body, opts).await
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, StoreError> {
        self.inner.get_object(key).await
    }

    async fn head_object(&self, key: &str) -> Result<ObjectHead, StoreError> {
        self.inner.head_object(key).await
    }

    async fn presign_put(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUrl, StoreError> {
        self.inner.presign_put(key, expires_in).await
    }

    async fn presign_get(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUrl, StoreError> {
        self.inner.presign_get(key, expires_in).await
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StoreError> {
        self.inner.list_objects(prefix).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        self.inner.delete_prefix(prefix).await
    }

    fn public_url(&self, key: &str) -> String {
        self.inner.public_url(key)
    }

    async fn set_alias(&self, alias_key: &str, target: &str) -> Result<(), StoreError> {
        let allowed = self
            .alias_writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(StoreError::Backend(format!("alias {alias_key} is read-only")));
        }
        self.inner.set_alias(alias_key, target).await
    }

    async fn get_alias(&self, alias_key: &str) -> Result<String, StoreError> {
        self.inner.get_alias(alias_key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key).await
    }
}

/// Broadcast bus that refuses events with the given names.
#[derive(Default)]
pub struct SelectiveBus {
    inner: BroadcastBus,
    rejected: Mutex<HashSet<&'static str>>,
}

#[allow(dead_code)]
impl SelectiveBus {
    pub fn reject(&self, name: &'static str) {
        self.rejected.lock().insert(name);
    }

    pub fn events_named(&self, name: &str) -> Vec<PipelineEvent> {
        self.inner.events_named(name)
    }

    pub fn history(&self) -> Vec<PipelineEvent> {
        self.inner.history()
    }
}

#[async_trait]
impl EventBus for SelectiveBus {
    async fn publish(&self, event: PipelineEvent) -> Result<(), EventError> {
        if self.rejected.lock().contains(event.name()) {
            return Err(EventError::Delivery(format!("{} rejected", event.name())));
        }
        self.inner.publish(event).await
    }
}

/// A pipeline over in-memory collaborators, with handles to inspect them.
pub struct Harness {
    pub store: Arc<dyn ArtifactStore>,
    pub cdn: Arc<LocalCdn>,
    pub events: Arc<SelectiveBus>,
    pub prober: Arc<ScriptedProber>,
    pub pipeline: Pipeline,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        Self::build(vec![site()], Arc::new(MemoryStore::default()), fast_settings())
    }

    pub fn with_sites(sites: Vec<Site>) -> Self {
        Self::build(sites, Arc::new(MemoryStore::default()), fast_settings())
    }

    pub fn with_settings(settings: PipelineSettings) -> Self {
        Self::build(vec![site()], Arc::new(MemoryStore::default()), settings)
    }

    pub fn with_store(store: Arc<dyn ArtifactStore>) -> Self {
        Self::build(vec![site()], store, fast_settings())
    }

    fn build(sites: Vec<Site>, store: Arc<dyn ArtifactStore>, settings: PipelineSettings) -> Self {
        init_tracing();
        let cdn = Arc::new(LocalCdn::new(Some("http://cdn.test".to_string())));
        let events = Arc::new(SelectiveBus::default());
        let prober = Arc::new(ScriptedProber::default());
        let catalog = Arc::new(SiteCatalog::new(sites));

        let pipeline = Pipeline::new(
            Collaborators {
                store: Arc::clone(&store),
                cdn: cdn.clone(),
                events: events.clone(),
                sites: catalog.clone(),
                contracts: catalog,
                builder: Arc::new(NoopBuilder),
                prober: prober.clone(),
            },
            settings,
        );

        Self {
            store,
            cdn,
            events,
            prober,
            pipeline,
        }
    }

    pub async fn live_alias(&self) -> Option<String> {
        self.store.get_alias("t1/s1/live").await.ok()
    }
}
