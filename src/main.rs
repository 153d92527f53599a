// src/main.rs

mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use mwpkg::Config;
use std::path::Path;
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Log level for the given verbosity flags
fn default_filter(verbose: u8, quiet: bool) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        _ => "debug",
    }
}

/// Debug log rotated daily, keeping `max_files` files
fn file_appender(dir: &Path, max_files: usize) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("mwpkg")
        .filename_suffix("log")
        .max_log_files(max_files)
        .build(dir)
        .with_context(|| format!("Cannot open log folder {}", dir.display()))
}

/// Console output per verbosity flags, plus the debug log file when its
/// folder is usable. The guard flushes the file on drop.
fn init_logging(cli: &Cli, config: &Config) -> Option<WorkerGuard> {
    let console = fmt::layer().with_writer(std::io::stderr).with_filter(
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter(cli.verbose, cli.quiet))),
    );

    let appender = config.log_directory().map(|dir| file_appender(&dir, config.log_files));
    let (file, guard, failure) = match appender {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(EnvFilter::new("mwpkg=debug"));
            (Some(layer), Some(guard), None)
        }
        Some(Err(e)) => (None, None, Some(e)),
        None => (None, None, None),
    };

    tracing_subscriber::registry().with(console).with(file).init();
    if let Some(e) = failure {
        tracing::warn!("Debug log disabled: {:#}", e);
    }
    guard
}

fn run(cli: Cli, config: &Config) -> Result<()> {
    match cli.command {
        Commands::Build {
            dmg,
            folder,
            targets,
            products,
            user,
            password,
            skip,
            dry_run,
        } => commands::cmd_build(
            config,
            commands::BuildOptions {
                dmg,
                folder,
                targets,
                products,
                user,
                password,
                skip,
                dry_run,
            },
        ),
        Commands::Inspect { archives, products } => commands::cmd_inspect(&archives, &products),
        Commands::Completions { shell } => commands::cmd_completions(shell),
    }
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let guard = init_logging(&cli, &config);
    let result = run(cli, &config);
    if let Err(e) = &result {
        error!("{:#}", e);
        eprintln!("Error: {e:#}");
    }

    // process::exit skips destructors
    drop(guard);
    if result.is_err() {
        std::process::exit(1);
    }
}
