// ABOUTME: Entry point for the sitepub CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::{App, PublishArgs};
use sitepub::config;
use sitepub::error::Result;
use sitepub::output::{Output, OutputMode};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = OutputMode::from_flags(cli.quiet, cli.json);
    let result = run(cli, mode).await;

    if let Err(e) = result {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, mode: OutputMode) -> Result<()> {
    let dir = match cli.dir {
        Some(dir) => dir,
        None => env::current_dir()?,
    };
    let output = Output::new(mode);

    match cli.command {
        Commands::Init {
            site,
            tenant,
            force,
        } => {
            config::init_config(&dir, site.as_deref(), tenant.as_deref(), force)?;
            output.success(&format!(
                "Created {}",
                PathBuf::from(config::CONFIG_FILENAME).display()
            ));
            Ok(())
        }
        Commands::Publish {
            site,
            tenant,
            intent,
            revision,
            previous,
            environment,
            flags,
            domain,
        } => {
            let app = App::open(&dir)?;
            let args = PublishArgs {
                site,
                tenant,
                intent,
                revision,
                previous,
                environment,
                flags,
                domain,
            };
            commands::publish(&app, args, output).await
        }
        Commands::Rollback {
            site,
            tenant,
            to,
            preview,
        } => {
            let app = App::open(&dir)?;
            commands::rollback(&app, &site, tenant.as_deref(), &to, preview, output).await
        }
        Commands::Status { site, tenant } => {
            let app = App::open(&dir)?;
            commands::status(&app, &site, tenant.as_deref(), output).await
        }
        Commands::Presign { key, put, expires } => {
            let app = App::open(&dir)?;
            commands::presign(&app, &key, put, expires, output).await
        }
        Commands::Prune {
            site,
            tenant,
            keep,
            dry_run,
        } => {
            let app = App::open(&dir)?;
            commands::prune(&app, &site, tenant.as_deref(), keep, dry_run, output).await
        }
    }
}
