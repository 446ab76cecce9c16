use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use matchsync_common::{load_settings, OracleSettings};
use matchsync_oracle::{FileProvider, MemoryBuffer, Oracle, OracleConfig};

/// Dry run: keep an in-process buffer in sync with a match file and log
/// every write the oracle would make.
#[derive(Parser)]
#[command(name = "oracle", about = "Match result oracle (dry run against an in-memory buffer)")]
struct Cli {
    /// Path to settings TOML file. Defaults apply if it does not exist.
    #[arg(long, default_value = "./config/oracle.toml")]
    config: PathBuf,

    /// JSON file of matches, re-read every cycle
    #[arg(long)]
    matches: PathBuf,

    /// Treat the match file as a reference snapshot and shift it to now
    #[arg(long)]
    anchor_now: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::from_default_env().add_directive("matchsync=info".parse()?);
    if cli.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Match oracle starting...");

    // Load settings: file, then env overrides
    let mut settings = if cli.config.exists() {
        info!(config = %cli.config.display(), "Loading settings");
        load_settings(&cli.config)?
    } else {
        info!(config = %cli.config.display(), "No settings file, using defaults");
        OracleSettings::default()
    };
    settings.apply_process_env()?;
    settings.validate()?;
    settings.log_summary();

    let mut provider = FileProvider::new(&cli.matches);
    if cli.anchor_now {
        provider = provider.anchored_at(Utc::now());
    }

    let buffer = Arc::new(MemoryBuffer::new(settings.buffer_capacity));
    let config = OracleConfig::from_settings(Arc::new(provider), &settings);

    // Ctrl-C cancels the oracle loop
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, stopping oracle"),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C, stopping oracle"),
        }
        signal.cancel();
    });

    let mut oracle = Oracle::new(buffer.clone(), config).with_shutdown(&shutdown);
    oracle.serve();
    oracle.wait().await;

    let state = buffer.snapshot().await;
    let mut keys: Vec<&String> = state.keys().collect();
    keys.sort();
    for key in keys {
        info!(key = key.as_str(), winner = state[key].as_str(), "Buffer entry");
    }
    info!(entries = state.len(), stats = %oracle.stats(), "Oracle exited");
    Ok(())
}
