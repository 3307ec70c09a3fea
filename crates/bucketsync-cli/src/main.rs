//! bucketsync - Sync local trees to an object store bucket
//!
//! Provides commands for:
//! - Uploading changed files from a directory, a file list or arguments
//! - Recursively deleting paths or numeric ids, locally or by remote fan-out
//! - Listing objects under a prefix
//! - Inspecting and validating the configuration
//!
//! Exits non-zero only for configuration errors and for runs aborted by the
//! failure-ratio circuit breaker. Individual file failures are reported in
//! the final counters.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bucketsync_core::config::Config;

mod commands;
mod output;

use commands::{
    config::ConfigCommand, delete::DeleteCommand, list::ListCommand, sync::SyncCommand, Context,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "bucketsync", version, about = "Sync local files to an object store bucket")]
pub struct Cli {
    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Upload changed files
    Sync(SyncCommand),
    /// Recursively delete paths or ids
    Delete(DeleteCommand),
    /// List objects under a prefix
    List(ListCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config_path, config) = match &cli.config {
        Some(path) => (path.clone(), Config::load(path)?),
        None => {
            let path = Config::default_path();
            let config = Config::load_or_default(&path);
            (path, config)
        }
    };

    let level = match cli.verbose {
        0 => config.logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = Context {
        config,
        config_path,
        format,
        cancel,
    };

    match &cli.command {
        Commands::Sync(cmd) => cmd.execute(&ctx).await,
        Commands::Delete(cmd) => cmd.execute(&ctx).await,
        Commands::List(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
    }
}

/// Cancels `token` on SIGINT or SIGTERM
///
/// Work already past its cancellation check finishes; everything else is
/// abandoned.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), finishing in-flight work"),
        _ = terminate => info!("Received SIGTERM, finishing in-flight work"),
    }

    token.cancel();
}
