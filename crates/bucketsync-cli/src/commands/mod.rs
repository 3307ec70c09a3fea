//! Subcommands
//!
//! Every command receives the loaded configuration, applies its own flag
//! overrides and validates the result before any work is scheduled.

pub mod config;
pub mod delete;
pub mod list;
pub mod sync;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;

use bucketsync_core::config::{Config, ConfigBuilder};
use bucketsync_core::domain::Dsn;
use bucketsync_store::HttpObjectStore;
use bucketsync_sync::RequestRateLimiter;

use crate::output::OutputFormat;

/// State shared by all commands
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    pub config_path: PathBuf,
    pub format: OutputFormat,
    /// Fired on SIGINT/SIGTERM
    pub cancel: CancellationToken,
}

impl Context {
    /// Starts a builder from the loaded configuration
    pub fn builder(&self) -> ConfigBuilder {
        ConfigBuilder::from_config(self.config.clone())
    }
}

/// Validates `builder`'s result, turning every problem into one error
pub fn finish_config(builder: ConfigBuilder) -> Result<Config> {
    match builder.build_validated() {
        Ok(config) => Ok(config),
        Err(errors) => {
            let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
            bail!("Invalid configuration: {}", details.join("; "))
        }
    }
}

/// Parses the DSN and opens the HTTP object store
pub fn connect(config: &Config) -> Result<(Dsn, Arc<HttpObjectStore>)> {
    let dsn = config.dsn()?;
    let store = HttpObjectStore::new(&dsn)?;
    Ok((dsn, Arc::new(store)))
}

/// Limiter shared by every request of one command
pub fn limiter(config: &Config) -> Arc<RequestRateLimiter> {
    Arc::new(RequestRateLimiter::from_config(&config.rate_limiting))
}
