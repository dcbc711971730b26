//! Panel Backup - Main entry point
//!
//! Incrementally backs up the working directories of panel-managed server
//! instances to a remote content store, one label (daily/weekly/...) per run.

use anyhow::Result;
use clap::Parser;
use panel_backup::{
    config::Config, coordinator::Coordinator, fs::exclude::ExclusionMatcher, panel::PanelClient,
    shutdown, uploader::CommandUploader, utils,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backup label selecting the cache and remote namespace (e.g. daily, weekly)
    label: Option<String>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "panel-backup.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)?;

    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    let Some(label) = args.label else {
        tracing::warn!("Usage: panel-backup <label (e.g. daily, weekly, monthly)>");
        std::process::exit(1);
    };

    tracing::info!(
        "Starting panel-backup v{} (label: {}, {} instances)",
        env!("CARGO_PKG_VERSION"),
        label,
        config.instances.len()
    );

    let cancel = CancellationToken::new();
    shutdown::spawn_signal_listener(cancel.clone());

    let panel = Arc::new(PanelClient::new(&config.panel)?);
    let uploader = Arc::new(CommandUploader::new(config.upload.program.clone()));
    let matcher = Arc::new(ExclusionMatcher::new(&config.backup.exclusions)?);

    let coordinator = Coordinator::new(panel, uploader, matcher, config.backup.clone(), cancel);
    coordinator.run(&label, &config.instances).await;

    tracing::info!("All instance backups finished");

    Ok(())
}
