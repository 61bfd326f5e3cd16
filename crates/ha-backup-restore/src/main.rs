//! Home Assistant restore step
//!
//! Runs the pending-restore part of startup and reports through the exit code:
//! `0` nothing restored, `100` restored and Home Assistant should be started
//! again, `1` the restore failed.

use anyhow::{Context, Result};
use clap::Parser;
use ha_backup_restore::{RestoreOutcome, Restorer, RESTART_EXIT_CODE};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Apply a pending Home Assistant backup restore
#[derive(Debug, Parser)]
#[command(name = "ha-restore", version, about)]
struct Cli {
    /// Directory that contains the Home Assistant configuration
    #[arg(short, long, value_name = "PATH_TO_CONFIG", env = "HASS_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn default_config_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".homeassistant"))
        .context("could not determine the home directory, pass --config")
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "info" };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_dir = match cli.config {
        Some(dir) => dir,
        None => default_config_dir()?,
    };

    let restorer = Restorer::new(config_dir);
    match restorer.run() {
        Ok(RestoreOutcome::NothingPending) => Ok(ExitCode::SUCCESS),
        Ok(RestoreOutcome::InvalidInstruction) => {
            warn!("Restore instruction was invalid, starting without restoring");
            Ok(ExitCode::SUCCESS)
        }
        Ok(RestoreOutcome::Restored(report)) => {
            info!(
                "Restored {} entries into {}",
                report.extracted.len(),
                restorer.config_dir().display()
            );
            Ok(ExitCode::from(RESTART_EXIT_CODE))
        }
        Err(err) => {
            error!("Restore failed: {}", err);
            Ok(ExitCode::FAILURE)
        }
    }
}
