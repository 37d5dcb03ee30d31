use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use civhelp::{HelperContext, Settings};

mod cli;

use cli::Cli;

/// Main entry point for the civhelp command line host
///
/// Loads settings from `config/` (or `--config`), installs file logging and
/// dispatches the requested command against a freshly built context.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load settings first
    let settings = match &cli.config {
        Some(dir) => Settings::from_dir(dir),
        None => Settings::new(),
    }
    .context("Failed to load settings")?;

    let log_dir: PathBuf = settings
        .logging
        .file
        .clone()
        .unwrap_or_else(|| PathBuf::from("logs"));
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    // Initialize the subscriber before any file operations
    let file_appender = tracing_appender::rolling::RollingFileAppender::new(
        tracing_appender::rolling::Rotation::DAILY,
        Path::new(&log_dir),
        "civhelp",
    );
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.to_lowercase()));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        // Disable ANSI colors for cleaner log files
        .with_ansi(false)
        .with_line_number(true)
        .with_file(true)
        .with_target(false)
        .with_env_filter(filter)
        .init();

    info!("civhelp starting up...");
    info!("Log directory: {}", log_dir.display());

    let ctx = HelperContext::new(settings).context("Failed to initialise helper context")?;

    cli::run(&ctx, cli.command).await
}
