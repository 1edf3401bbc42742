// ABOUTME: Publishing pipeline: drives a release from draft to live through fixed steps.
// ABOUTME: Failures after activation roll the alias back to the previous release.

mod activation;
mod checks;
mod context;
mod error;
mod lock;
mod manifest;
mod package;
mod request;
mod result;
mod retention;
mod retry;
mod rollback;
mod state;
mod upload;

pub use checks::{VerifySettings, WarmReport, WarmSettings, default_warm_routes, route_url};
pub use context::{
    ActivationResult, ErrorRecord, PipelineContext, StateHistoryEntry, StepMetric, Transition,
};
pub use error::{PipelineError, PipelineErrorKind, PublishFailure};
pub use lock::{LockInfo, LockPolicy, SiteLockGuard, SiteLocks};
pub use manifest::{
    ArtifactManifest, MANIFEST_FORMAT_VERSION, ManifestFile, ManifestMetadata, canonical_json,
};
pub use package::{
    IMMUTABLE_CACHE, NO_CACHE, PackageInput, PackagedFile, ReleasePackage, cache_policy_for,
    content_type_for, package_release,
};
pub use request::{DeploymentIntent, PublishRequest};
pub use result::{DeploymentResult, PerformanceMetrics};
pub use retention::{
    PruneReport, ReleaseSummary, SiteStatus, aliased_releases, list_releases, prune_releases,
};
pub use retry::RetryPolicy;
pub use rollback::RollbackOutcome;
pub use state::{PipelineState, Step};
pub use upload::UploadReport;

use chrono::Utc;
use snafu::IntoError;
use std::sync::Arc;
use std::time::Instant;

use crate::build::SiteBuilder;
use crate::cdn::{CdnProvider, PreviewOptions, release_tags};
use crate::contract::{ContractGenerator, ContractOptions, SiteRepository};
use crate::diagnostics::{Diagnostics, Warning};
use crate::events::{EventBus, KbRefreshRequested, PipelineEvent, SitePublished, StateChanged};
use crate::probe::HttpProber;
use crate::store::{AliasSlot, ArtifactStore, ReleaseLayout};
use crate::types::{DeploymentId, SiteId, TenantId};

use error::PublishFailureSnafu;
use result::millis;

/// Shared services a pipeline runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ArtifactStore>,
    pub cdn: Arc<dyn CdnProvider>,
    pub events: Arc<dyn EventBus>,
    pub sites: Arc<dyn SiteRepository>,
    pub contracts: Arc<dyn ContractGenerator>,
    pub builder: Arc<dyn SiteBuilder>,
    pub prober: Arc<dyn HttpProber>,
}

/// Tunables for a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub warm: WarmSettings,
    pub verify: VerifySettings,
    pub retry: RetryPolicy,
    pub lock_policy: LockPolicy,
    /// Objects uploaded in parallel.
    pub upload_concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            warm: WarmSettings::default(),
            verify: VerifySettings::default(),
            retry: RetryPolicy::default(),
            lock_policy: LockPolicy::default(),
            upload_concurrency: 8,
        }
    }
}

/// Publishes site releases.
pub struct Pipeline {
    deps: Collaborators,
    settings: PipelineSettings,
    locks: SiteLocks,
}

impl Pipeline {
    pub fn new(deps: Collaborators, settings: PipelineSettings) -> Self {
        let locks = SiteLocks::new(Arc::clone(&deps.store), settings.lock_policy);
        Self {
            deps,
            settings,
            locks,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn locks(&self) -> &SiteLocks {
        &self.locks
    }

    /// Run one publish from draft to a terminal state.
    ///
    /// On failure the returned [`PublishFailure`] carries the run's final
    /// context, including step metrics for every step that was entered.
    pub async fn publish(&self, request: PublishRequest) -> Result<DeploymentResult, PublishFailure> {
        let mut ctx = PipelineContext::new(request);
        tracing::info!(
            deployment = %ctx.deployment_id(),
            site = %ctx.request().site_id,
            tenant = %ctx.request().tenant_id,
            intent = %ctx.request().deployment_intent,
            "publish started"
        );

        let guard = match self
            .locks
            .acquire(
                &ctx.request().tenant_id,
                &ctx.request().site_id,
                ctx.deployment_id(),
            )
            .await
        {
            Ok(guard) => guard,
            Err(e) => return Err(self.fail(ctx, e).await),
        };

        // The lock is held through rollback.
        let outcome = match self.run(&mut ctx).await {
            Ok(result) => Ok(result),
            Err(e) => Err(self.fail(ctx, e).await),
        };
        guard.release().await;

        if let Ok(result) = &outcome {
            tracing::info!(
                deployment = %result.deployment_id,
                release = %result.release_hash.short(),
                url = %result.cdn_url,
                warnings = result.warnings.len(),
                "publish succeeded"
            );
        }
        outcome
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<DeploymentResult, PipelineError> {
        self.validate(ctx).await?;
        for step in Step::ALL {
            self.execute(ctx, step).await?;
        }
        self.enter(ctx, PipelineState::Succeeded).await?;
        self.assemble(ctx)
    }

    /// Record the error, then roll back or fail depending on where the run stopped.
    async fn fail(&self, mut ctx: PipelineContext, err: PipelineError) -> PublishFailure {
        ctx.record_error(&err);
        tracing::error!(
            deployment = %ctx.deployment_id(),
            state = %ctx.state(),
            kind = ?err.kind(),
            "publish failed: {}",
            err
        );

        let mut rollback_error = None;
        if ctx.state().is_rollback_eligible() {
            if let Err(e) = self.rollback(&mut ctx).await {
                tracing::error!(deployment = %ctx.deployment_id(), "rollback failed: {}", e);
                rollback_error = Some(e);
            }
        } else {
            self.finish_failed(&mut ctx).await;
        }

        PublishFailureSnafu {
            rollback_error,
            context: Box::new(ctx),
        }
        .into_error(err)
    }

    /// Point the alias back at the request's previous deployment.
    ///
    /// Without a previous deployment the run ends `failed` with
    /// [`PipelineError::RollbackUnavailable`].
    pub async fn rollback(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let Some(previous) = ctx.request().previous_deployment_id.clone() else {
            let err = PipelineError::RollbackUnavailable;
            ctx.record_error(&err);
            self.finish_failed(ctx).await;
            return Err(err);
        };

        if let Err(e) = self.enter(ctx, PipelineState::RollingBack).await {
            self.finish_failed(ctx).await;
            return Err(e);
        }

        let layout = layout_of(ctx.request());
        let slot = ctx.request().deployment_intent.alias_slot();
        let restored = rollback::restore_release(
            self.deps.store.as_ref(),
            self.deps.cdn.as_ref(),
            &layout,
            slot,
            previous.as_str(),
            self.settings.warm.purge_timeout,
            ctx.diagnostics_mut(),
        )
        .await;

        match restored {
            Ok(activation) => {
                tracing::info!(
                    deployment = %ctx.deployment_id(),
                    target = %activation.target,
                    "restored previous release"
                );
                self.enter(ctx, PipelineState::RolledBack).await
            }
            Err(e) => {
                let err = PipelineError::RollbackFailed(e.to_string());
                self.finish_failed(ctx).await;
                Err(err)
            }
        }
    }

    async fn finish_failed(&self, ctx: &mut PipelineContext) {
        if ctx.state().is_terminal() {
            return;
        }
        if let Err(e) = self.enter(ctx, PipelineState::Failed).await {
            tracing::error!(deployment = %ctx.deployment_id(), "could not mark run failed: {}", e);
        }
    }

    /// Switch a site's alias to an earlier stored release.
    pub async fn rollback_site(
        &self,
        tenant: &TenantId,
        site: &SiteId,
        release: &str,
        slot: AliasSlot,
    ) -> Result<RollbackOutcome, PipelineError> {
        self.deps.sites.find_by_id(site, tenant).await?;
        let guard = self
            .locks
            .acquire(tenant, site, &DeploymentId::generate())
            .await?;
        let outcome = self.restore(tenant, site, release, slot).await;
        guard.release().await;
        outcome
    }

    async fn restore(
        &self,
        tenant: &TenantId,
        site: &SiteId,
        release: &str,
        slot: AliasSlot,
    ) -> Result<RollbackOutcome, PipelineError> {
        let layout = ReleaseLayout::new(tenant, site);
        if !self
            .deps
            .store
            .exists(&layout.manifest_key(release))
            .await?
        {
            return Err(PipelineError::InvalidRequest(format!(
                "release {release} of {tenant}/{site} is not stored or incomplete"
            )));
        }

        let mut diagnostics = Diagnostics::default();
        let activation = rollback::restore_release(
            self.deps.store.as_ref(),
            self.deps.cdn.as_ref(),
            &layout,
            slot,
            release,
            self.settings.warm.purge_timeout,
            &mut diagnostics,
        )
        .await?;
        Ok(RollbackOutcome {
            activation,
            diagnostics,
        })
    }

    /// Aliases, stored releases and any running publish of a site.
    pub async fn site_status(
        &self,
        tenant: &TenantId,
        site: &SiteId,
    ) -> Result<SiteStatus, PipelineError> {
        let layout = ReleaseLayout::new(tenant, site);
        let store = self.deps.store.as_ref();
        Ok(SiteStatus {
            tenant: tenant.clone(),
            site: site.clone(),
            aliases: aliased_releases(store, &layout).await?,
            releases: list_releases(store, &layout).await?,
            lock: self.locks.holder(tenant, site).await?,
        })
    }

    /// Delete all but the newest `keep` releases of a site.
    pub async fn prune(
        &self,
        tenant: &TenantId,
        site: &SiteId,
        keep: usize,
        dry_run: bool,
    ) -> Result<PruneReport, PipelineError> {
        let guard = self
            .locks
            .acquire(tenant, site, &DeploymentId::generate())
            .await?;
        let layout = ReleaseLayout::new(tenant, site);
        let report = prune_releases(self.deps.store.as_ref(), &layout, keep, dry_run).await;
        guard.release().await;
        report
    }

    /// Transition and announce the state change. Event delivery is best-effort.
    async fn enter(
        &self,
        ctx: &mut PipelineContext,
        next: PipelineState,
    ) -> Result<(), PipelineError> {
        let transition = ctx.transition_to(next)?;
        tracing::info!(
            deployment = %ctx.deployment_id(),
            from = %transition.from,
            to = %transition.to,
            "state changed"
        );

        let event = PipelineEvent::StateChanged(StateChanged {
            deployment_id: ctx.deployment_id().clone(),
            site_id: ctx.request().site_id.clone(),
            previous_state: transition.from,
            current_state: transition.to,
            duration_ms: millis(transition.elapsed),
        });
        if let Err(e) = self.deps.events.publish(event).await {
            ctx.diagnostics_mut().warn(Warning::event_delivery(format!(
                "state change {} -> {} not delivered: {e}",
                transition.from, transition.to
            )));
        }
        Ok(())
    }

    /// Enter the step's state, run it and record its metric either way.
    async fn execute(&self, ctx: &mut PipelineContext, step: Step) -> Result<(), PipelineError> {
        self.enter(ctx, step.state()).await?;

        let start_time = Utc::now();
        let started = Instant::now();
        let outcome = match step {
            Step::Build => self.build(ctx).await,
            Step::Contract => self.contract(ctx).await,
            Step::Package => self.package(ctx),
            Step::Upload => self.upload(ctx).await,
            Step::Activate => self.activate(ctx).await,
            Step::Warm => self.warm(ctx).await,
            Step::Verify => self.verify(ctx).await,
            Step::Announce => self.announce(ctx).await,
        };
        let elapsed = started.elapsed();
        ctx.record_step(step, start_time, elapsed, outcome.is_ok());
        tracing::debug!(%step, ?elapsed, ok = outcome.is_ok(), "step finished");
        outcome
    }

    async fn validate(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let request = ctx.request();
        let site = self
            .deps
            .sites
            .find_by_id(&request.site_id, &request.tenant_id)
            .await?;

        if request.deployment_intent == DeploymentIntent::Production && !site.publishable {
            return Err(PipelineError::NotPublishable(site.id));
        }
        if let Some(revision) = &request.revision
            && revision.trim().is_empty()
        {
            return Err(PipelineError::InvalidRequest(
                "revision must not be blank".to_string(),
            ));
        }
        if let Some(domain) = custom_domain(request)
            && (domain.is_empty() || domain.contains(['/', ':']) || domain.contains(char::is_whitespace))
        {
            return Err(PipelineError::InvalidRequest(format!(
                "custom domain {domain:?} must be a bare host name"
            )));
        }

        ctx.site = Some(site);
        Ok(())
    }

    async fn build(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let site = ctx.site.as_ref().ok_or_else(|| missing("site"))?;
        let params = ctx.request().build_parameters.clone().unwrap_or_default();
        let output = self.deps.builder.build(site, &params).await?;
        tracing::info!(
            assets = output.assets.len(),
            bytes = output.total_bytes(),
            "site built"
        );
        ctx.build = Some(output);
        Ok(())
    }

    async fn contract(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let site = ctx.site.as_ref().ok_or_else(|| missing("site"))?;
        let opts = ContractOptions {
            base_url: custom_domain(ctx.request()).map(|domain| format!("https://{domain}")),
            preview: ctx.request().deployment_intent == DeploymentIntent::Preview,
        };
        let contract = self.deps.contracts.generate_contract(site, &opts).await?;
        ctx.contract = Some(contract);
        Ok(())
    }

    fn package(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let request = ctx.request();
        let package = package_release(PackageInput {
            site_id: &request.site_id,
            tenant_id: &request.tenant_id,
            environment: request.environment(),
            revision: request.revision.as_deref(),
            contract: ctx.contract.as_ref().ok_or_else(|| missing("contract"))?,
            contract_paths: ctx.contract_paths(),
            build: ctx.build.as_ref().ok_or_else(|| missing("build output"))?,
        })?;

        ctx.set_manifest(package.manifest)?;
        ctx.packaged = package.files;
        ctx.build = None;
        Ok(())
    }

    async fn upload(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let manifest = ctx
            .artifact_manifest()
            .ok_or_else(|| missing("artifact manifest"))?;
        let report = upload::upload_release(
            self.deps.store.as_ref(),
            &layout_of(ctx.request()),
            manifest,
            &ctx.packaged,
            &self.settings.retry,
            self.settings.upload_concurrency,
        )
        .await?;
        ctx.upload = Some(report);
        Ok(())
    }

    async fn activate(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let release = ctx
            .release_hash()
            .cloned()
            .ok_or_else(|| missing("release hash"))?;
        let request = ctx.request();
        let layout = layout_of(request);
        let intent = request.deployment_intent;

        let activation = activation::activate(
            self.deps.store.as_ref(),
            &layout,
            intent.alias_slot(),
            release.as_str(),
        )
        .await?;

        let origin_url = self.deps.store.public_url(
            layout
                .release_prefix(release.as_str())
                .trim_end_matches('/'),
        );
        let preview_url = match intent {
            DeploymentIntent::Preview => Some(
                self.deps
                    .cdn
                    .create_preview_url(
                        &origin_url,
                        &release,
                        &PreviewOptions {
                            ttl: None,
                            label: Some(ctx.deployment_id().to_string()),
                        },
                    )
                    .await?,
            ),
            DeploymentIntent::Production => None,
        };
        let serving_url = match (&preview_url, custom_domain(request)) {
            (Some(url), _) => url.clone(),
            (None, Some(domain)) => format!("https://{domain}"),
            (None, None) => ctx
                .site
                .as_ref()
                .ok_or_else(|| missing("site"))?
                .base_url
                .clone(),
        };

        ctx.set_activation(activation);
        ctx.origin_url = Some(origin_url);
        ctx.preview_url = preview_url;
        ctx.serving_url = Some(serving_url);
        Ok(())
    }

    async fn warm(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let base = ctx
            .serving_url
            .clone()
            .ok_or_else(|| missing("serving URL"))?;
        let release = ctx
            .release_hash()
            .cloned()
            .ok_or_else(|| missing("release hash"))?;
        let request = ctx.request();
        let tags = release_tags(
            request.tenant_id.as_str(),
            request.site_id.as_str(),
            &release,
        );

        let report = checks::warm(
            self.deps.cdn.as_ref(),
            self.deps.prober.as_ref(),
            &base,
            &tags,
            &self.settings.warm,
            ctx.diagnostics_mut(),
        )
        .await;
        tracing::info!(
            warmed = report.warmed.len(),
            failed = report.failed.len(),
            "routes warmed"
        );
        ctx.warm = Some(report);
        Ok(())
    }

    async fn verify(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let base = ctx
            .serving_url
            .as_deref()
            .ok_or_else(|| missing("serving URL"))?;
        checks::verify(
            self.deps.prober.as_ref(),
            base,
            &self.settings.verify,
            &self.settings.retry,
        )
        .await
    }

    /// `site.published` must be delivered; the knowledge-base refresh is best-effort.
    async fn announce(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let release = ctx
            .release_hash()
            .cloned()
            .ok_or_else(|| missing("release hash"))?;
        let request = ctx.request();

        let published = PipelineEvent::SitePublished(SitePublished {
            deployment_id: ctx.deployment_id().clone(),
            site_id: request.site_id.clone(),
            tenant_id: request.tenant_id.clone(),
            release_hash: release.clone(),
            deployment_intent: request.deployment_intent,
            published_at: Utc::now(),
            contract_paths: ctx.contract_paths().clone(),
        });
        let refresh = PipelineEvent::KbRefreshRequested(KbRefreshRequested {
            site_id: request.site_id.clone(),
            release_hash: release,
            reason: "site.published".to_string(),
        });

        self.deps.events.publish(published).await?;
        if let Err(e) = self.deps.events.publish(refresh).await {
            ctx.diagnostics_mut().warn(Warning::event_delivery(format!(
                "knowledge base refresh request not delivered: {e}"
            )));
        }
        Ok(())
    }

    fn assemble(&self, ctx: &PipelineContext) -> Result<DeploymentResult, PipelineError> {
        Ok(DeploymentResult {
            deployment_id: ctx.deployment_id().clone(),
            release_hash: ctx
                .release_hash()
                .cloned()
                .ok_or_else(|| missing("release hash"))?,
            cdn_url: ctx
                .serving_url
                .clone()
                .ok_or_else(|| missing("serving URL"))?,
            origin_url: ctx
                .origin_url
                .clone()
                .ok_or_else(|| missing("origin URL"))?,
            preview_url: ctx.preview_url.clone(),
            contract_paths: ctx.contract_paths().clone(),
            activation: ctx
                .activation()
                .cloned()
                .ok_or_else(|| missing("activation"))?,
            warm: ctx.warm.clone().unwrap_or_default(),
            metrics: PerformanceMetrics::from_context(ctx, ctx.upload_report()),
            warnings: ctx.diagnostics().warnings().to_vec(),
        })
    }
}

fn layout_of(request: &PublishRequest) -> ReleaseLayout {
    ReleaseLayout::new(&request.tenant_id, &request.site_id)
}

fn custom_domain(request: &PublishRequest) -> Option<&str> {
    request
        .build_parameters
        .as_ref()
        .and_then(|p| p.custom_domain.as_deref())
}

fn missing(what: &str) -> PipelineError {
    PipelineError::Internal(format!("{what} is not available at this point of the run"))
}
