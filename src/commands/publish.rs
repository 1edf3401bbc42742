// ABOUTME: Publish command implementation.
// ABOUTME: Runs the pipeline for one site and reports progress, warnings, and the result.

use super::App;
use sitepub::build::BuildParameters;
use sitepub::error::Result;
use sitepub::events::PipelineEvent;
use sitepub::output::{Output, OutputMode};
use sitepub::pipeline::{DeploymentIntent, PublishRequest};
use sitepub::types::DeploymentId;

pub struct PublishArgs {
    pub site: String,
    pub tenant: Option<String>,
    pub intent: DeploymentIntent,
    pub revision: Option<String>,
    pub previous: Option<String>,
    pub environment: String,
    pub flags: Vec<(String, String)>,
    pub domain: Option<String>,
}

pub async fn publish(app: &App, args: PublishArgs, mut output: Output) -> Result<()> {
    output.start_timer();
    let (tenant, site) = app.site_ids(&args.site, args.tenant.as_deref())?;

    // Without an explicit target, a failed publish returns to whatever is served now.
    let previous = match args.previous {
        Some(previous) => Some(DeploymentId::parse(&previous)?),
        None => app
            .pipeline
            .site_status(&tenant, &site)
            .await?
            .aliases
            .get(&args.intent.alias_slot())
            .and_then(|release| DeploymentId::parse(release).ok()),
    };

    let mut request = PublishRequest::new(site.clone(), tenant.clone(), args.intent)
        .with_build_parameters(BuildParameters {
            environment: args.environment,
            feature_flags: args.flags.into_iter().collect(),
            custom_domain: args.domain,
        });
    if let Some(revision) = args.revision {
        request = request.with_revision(revision);
    }
    if let Some(previous) = previous {
        request = request.with_previous_deployment(previous);
    }

    output.progress(&format!(
        "Publishing {tenant}/{site} ({})",
        request.deployment_intent
    ));

    let mut events = app.events.subscribe();
    let show_progress = output.mode() == OutputMode::Normal;
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let PipelineEvent::StateChanged(change) = event
                && show_progress
            {
                println!("  → {}", change.current_state);
            }
        }
    });

    let outcome = app.pipeline.publish(request).await;
    progress.abort();

    match outcome {
        Ok(result) => {
            for warning in &result.warnings {
                output.warning(&warning.message);
            }
            let mut lines = vec![
                format!("release: {}", result.release_hash),
                format!("url: {}", result.cdn_url),
                format!("origin: {}", result.origin_url),
            ];
            if let Some(preview) = &result.preview_url {
                lines.push(format!("preview: {preview}"));
            }
            lines.push(format!(
                "files: {} ({} uploaded, {} reused)",
                result.metrics.file_count,
                result.metrics.objects_uploaded,
                result.metrics.objects_reused
            ));
            output.result(
                &format!("Published {tenant}/{site} ({:.1}s)", output.elapsed_secs()),
                &lines,
                &result,
            );
            Ok(())
        }
        Err(failure) => {
            for warning in failure.context().diagnostics().warnings() {
                output.warning(&warning.message);
            }
            if let Some(rollback_error) = failure.rollback_error() {
                output.warning(&format!("rollback also failed: {rollback_error}"));
            }
            output.progress(&format!("Run ended {}", failure.final_state()));
            Err(failure.into())
        }
    }
}
