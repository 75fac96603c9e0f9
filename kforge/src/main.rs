//! kforge - build orchestrator for a cross-compiled OS tree
//!
//! Drives the kernel, drivers, libraries and userspace pipelines of
//! `convenient-osbuild` with real toolchain processes.

mod commands;

use clap::Parser;
use commands::{Cli, Commands};
use convenient_osbuild::{BuildConfig, BuildError, BuildResult};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "kforge=info,convenient_osbuild=info,convenient_toolchain=info";
const VERBOSE_FILTER: &str = "kforge=debug,convenient_osbuild=debug,convenient_toolchain=debug";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Build { category, no_ksyms } => {
            commands::build::run(&config, category, !no_ksyms, cli.timeout_retries).await
        }
        Commands::Targets => commands::targets::run(&config),
        Commands::Stats => commands::stats::run(&config),
        Commands::Clean { sysroot } => commands::clean::run(&config, sysroot).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("kforge: {} failed: {}", e.phase(), e);
            ExitCode::FAILURE
        }
    }
}

/// Defaults, then the YAML file, then command-line overrides
fn load_config(cli: &Cli) -> BuildResult<BuildConfig> {
    let root = std::path::absolute(&cli.root).map_err(|e| BuildError::Io(cli.root.clone(), e))?;
    let mut config = BuildConfig::load(root, cli.config.as_deref())?;

    if let Some(jobs) = cli.jobs {
        config.jobs = jobs;
    }
    if let Some(secs) = cli.timeout {
        config.tool_timeout = Duration::from_secs(secs);
    }

    config.validate()?;
    Ok(config)
}
