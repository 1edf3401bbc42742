// ABOUTME: Wires config into a ready pipeline for one CLI invocation.
// ABOUTME: Collaborators are built once here and shared by reference.

use sitepub::build::DirectoryBuilder;
use sitepub::cdn::LocalCdn;
use sitepub::config::Config;
use sitepub::error::Result;
use sitepub::events::BroadcastBus;
use sitepub::pipeline::{Collaborators, Pipeline};
use sitepub::probe::ReqwestProber;
use sitepub::store::ArtifactStore;
use sitepub::types::{SiteId, TenantId};
use std::path::Path;
use std::sync::Arc;

pub struct App {
    pub config: Config,
    pub store: Arc<dyn ArtifactStore>,
    pub events: Arc<BroadcastBus>,
    pub pipeline: Pipeline,
}

impl App {
    pub fn open(dir: &Path) -> Result<Self> {
        let config = Config::discover(dir)?;
        let store = config.storage.open(&config.base_dir)?;
        let events = Arc::new(BroadcastBus::new());
        let catalog = Arc::new(config.catalog());

        let deps = Collaborators {
            store: Arc::clone(&store),
            cdn: Arc::new(LocalCdn::new(config.cdn.base_url.clone())),
            events: events.clone(),
            sites: catalog.clone(),
            contracts: catalog,
            builder: Arc::new(DirectoryBuilder::new(config.base_dir.clone())),
            prober: Arc::new(ReqwestProber::new()?),
        };
        let pipeline = Pipeline::new(deps, config.pipeline_settings());

        Ok(Self {
            config,
            store,
            events,
            pipeline,
        })
    }

    /// Resolve `--site`/`--tenant` against the configured sites.
    pub fn site_ids(&self, site: &str, tenant: Option<&str>) -> Result<(TenantId, SiteId)> {
        let site = SiteId::parse(site)?;
        let tenant = tenant.map(TenantId::parse).transpose()?;
        let configured = self.config.site(&site, tenant.as_ref())?;
        Ok((configured.tenant_id.clone(), configured.id.clone()))
    }
}
