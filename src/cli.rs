// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use sitepub::pipeline::DeploymentIntent;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "sitepub")]
#[command(about = "Atomic, content-addressed publishing for generated websites")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print the final result
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Directory to look for sitepub.yml in (defaults to the current directory)
    #[arg(short = 'C', long, global = true)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new sitepub.yml configuration file
    Init {
        /// Site id for the template
        #[arg(long)]
        site: Option<String>,

        /// Tenant id for the template
        #[arg(long)]
        tenant: Option<String>,

        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Build, upload and activate a new release of a site
    Publish {
        #[arg(long)]
        site: String,

        /// Owning tenant (defaults to the configured one)
        #[arg(long)]
        tenant: Option<String>,

        /// preview or production
        #[arg(long, default_value = "production")]
        intent: DeploymentIntent,

        /// Source revision recorded in the manifest
        #[arg(long)]
        revision: Option<String>,

        /// Release to roll back to on failure (defaults to the currently served one)
        #[arg(long)]
        previous: Option<String>,

        /// Build environment
        #[arg(long, default_value = "production")]
        environment: String,

        /// Feature flag passed to the build, as key=value
        #[arg(long = "flag", value_parser = parse_flag)]
        flags: Vec<(String, String)>,

        /// Custom domain the site is served on
        #[arg(long)]
        domain: Option<String>,
    },

    /// Point a site back at an earlier release
    Rollback {
        #[arg(long)]
        site: String,

        #[arg(long)]
        tenant: Option<String>,

        /// Release hash to restore
        #[arg(long)]
        to: String,

        /// Switch the preview alias instead of live
        #[arg(long)]
        preview: bool,
    },

    /// Show aliases, stored releases and running publishes of a site
    Status {
        #[arg(long)]
        site: String,

        #[arg(long)]
        tenant: Option<String>,
    },

    /// Create a presigned URL for a store object
    Presign {
        /// Object key
        key: String,

        /// Sign for upload instead of download
        #[arg(long)]
        put: bool,

        /// Validity, e.g. 15m or 1h
        #[arg(long, default_value = "15m", value_parser = parse_duration)]
        expires: Duration,
    },

    /// Delete old releases, keeping the newest and any that are aliased
    Prune {
        #[arg(long)]
        site: String,

        #[arg(long)]
        tenant: Option<String>,

        /// Releases to keep besides aliased ones
        #[arg(long, default_value_t = 5)]
        keep: usize,

        /// Only report what would be deleted
        #[arg(long)]
        dry_run: bool,
    },
}

fn parse_flag(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(raw).map_err(|e| e.to_string())
}
