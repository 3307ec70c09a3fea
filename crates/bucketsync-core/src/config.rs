//! Configuration module for bucketsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//! Every section is `#[serde(default)]`, so a file only needs the keys it changes.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::domain::Dsn;
use crate::ports::InvocationMode;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for bucketsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub rate_limiting: RateLimitingConfig,
    pub listing: ListingConfig,
    pub invoke: InvokeConfig,
    pub logging: LoggingConfig,
}

/// Object store connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Connection string, e.g. `bucket=b region=us-east-1`. `None` until set
    /// here, on the command line or through the `DSN` environment variable.
    pub dsn: Option<String>,
}

/// Sync pass settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Number of concurrent upload workers.
    pub workers: usize,
    /// Tasks that may wait in the pool queue before submission blocks.
    pub queue_capacity: usize,
    /// Remote prefix joined in front of every relative path.
    pub prefix: String,
    /// Canned ACL sent with every upload.
    pub acl: String,
    /// Upload without running change detection.
    pub force: bool,
    /// Detect changes but never write to the store.
    pub dry_run: bool,
    /// Failure percentage above which retries are abandoned.
    pub max_retry_percent: f64,
    /// Seconds between progress log lines.
    pub status_interval_secs: u64,
    /// Only files with these extensions are synchronised; empty means all.
    pub extensions: Vec<String>,
}

/// Outbound request admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    pub requests_per_minute: u32,
    /// Denied attempts before giving up.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    /// Growth of the backoff per denied attempt, in percent.
    pub backoff_growth_percent: u32,
    pub max_backoff_ms: u64,
}

/// Remote listing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// Objects requested per LIST page.
    pub max_keys: usize,
    /// Abort the listing on the first callback failure.
    pub strict: bool,
    /// Log listing throughput every ten seconds.
    pub timings: bool,
}

/// Remote invocation fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokeConfig {
    /// Endpoint invocations are POSTed to.
    pub endpoint: Option<String>,
    /// Concurrent invocations in flight.
    pub clients: usize,
    pub mode: InvocationMode,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/bucketsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("bucketsync")
            .join("config.yaml")
    }

    /// Parses `store.dsn`.
    pub fn dsn(&self) -> anyhow::Result<Dsn> {
        let raw = self
            .store
            .dsn
            .as_deref()
            .context("Missing DSN")?;
        Ok(Dsn::parse(raw)?)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Twice the available parallelism.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 2
}

impl Default for SyncConfig {
    fn default() -> Self {
        let workers = default_workers();
        Self {
            workers,
            queue_capacity: workers * 4,
            prefix: String::new(),
            acl: "public-read".to_string(),
            force: false,
            dry_run: false,
            max_retry_percent: 25.0,
            status_interval_secs: 60,
            extensions: Vec::new(),
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 100_000,
            max_attempts: 1000,
            initial_backoff_ms: 100,
            backoff_growth_percent: 10,
            max_backoff_ms: 60_000,
        }
    }
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            max_keys: 500,
            strict: false,
            timings: false,
        }
    }
}

impl Default for InvokeConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            clients: 10,
            mode: InvocationMode::RequestResponse,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.workers"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Largest page size S3-compatible stores accept.
const MAX_LIST_KEYS: usize = 1000;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid. A missing DSN is not
    /// an error here; commands that need one report it themselves.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let positive = "must be greater than 0";

        // --- store ---
        if let Some(raw) = &self.store.dsn {
            if let Err(e) = Dsn::parse(raw) {
                errors.push(ValidationError::new("store.dsn", e.to_string()));
            }
        }

        // --- sync ---
        if self.sync.workers == 0 {
            errors.push(ValidationError::new("sync.workers", positive));
        }
        if self.sync.queue_capacity == 0 {
            errors.push(ValidationError::new("sync.queue_capacity", positive));
        }
        if !(0.0..=100.0).contains(&self.sync.max_retry_percent) {
            errors.push(ValidationError::new(
                "sync.max_retry_percent",
                format!("must be between 0 and 100, got {}", self.sync.max_retry_percent),
            ));
        }
        if self.sync.status_interval_secs == 0 {
            errors.push(ValidationError::new("sync.status_interval_secs", positive));
        }
        if self.sync.acl.trim().is_empty() {
            errors.push(ValidationError::new("sync.acl", "must not be empty"));
        }

        // --- rate_limiting ---
        if self.rate_limiting.requests_per_minute == 0 {
            errors.push(ValidationError::new("rate_limiting.requests_per_minute", positive));
        }
        if self.rate_limiting.max_attempts == 0 {
            errors.push(ValidationError::new("rate_limiting.max_attempts", positive));
        }
        if self.rate_limiting.initial_backoff_ms == 0 {
            errors.push(ValidationError::new("rate_limiting.initial_backoff_ms", positive));
        }
        if self.rate_limiting.max_backoff_ms < self.rate_limiting.initial_backoff_ms {
            errors.push(ValidationError::new(
                "rate_limiting.max_backoff_ms",
                format!(
                    "must not be smaller than initial_backoff_ms ({})",
                    self.rate_limiting.initial_backoff_ms
                ),
            ));
        }

        // --- listing ---
        if self.listing.max_keys == 0 || self.listing.max_keys > MAX_LIST_KEYS {
            errors.push(ValidationError::new(
                "listing.max_keys",
                format!("must be between 1 and {MAX_LIST_KEYS}"),
            ));
        }

        // --- invoke ---
        if self.invoke.clients == 0 {
            errors.push(ValidationError::new("invoke.clients", positive));
        }
        if let Some(endpoint) = &self.invoke.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                errors.push(ValidationError::new(
                    "invoke.endpoint",
                    format!("must be an http(s) URL, got '{endpoint}'"),
                ));
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError::new(
                "logging.level",
                format!(
                    "invalid level '{}', expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            ));
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`Config`], starting from defaults.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from [`Config::default`].
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Start from an existing configuration, e.g. one loaded from disk.
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    pub fn dsn(mut self, dsn: impl Into<String>) -> Self {
        self.config.store.dsn = Some(dsn.into());
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.sync.workers = n;
        self
    }

    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.config.sync.queue_capacity = n;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.sync.prefix = prefix.into();
        self
    }

    pub fn acl(mut self, acl: impl Into<String>) -> Self {
        self.config.sync.acl = acl.into();
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.config.sync.force = force;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.sync.dry_run = dry_run;
        self
    }

    pub fn max_retry_percent(mut self, percent: f64) -> Self {
        self.config.sync.max_retry_percent = percent;
        self
    }

    pub fn status_interval_secs(mut self, seconds: u64) -> Self {
        self.config.sync.status_interval_secs = seconds;
        self
    }

    pub fn extensions(mut self, extensions: Vec<String>) -> Self {
        self.config.sync.extensions = extensions;
        self
    }

    pub fn requests_per_minute(mut self, n: u32) -> Self {
        self.config.rate_limiting.requests_per_minute = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.rate_limiting.max_attempts = n;
        self
    }

    pub fn max_keys(mut self, n: usize) -> Self {
        self.config.listing.max_keys = n;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.config.listing.strict = strict;
        self
    }

    pub fn timings(mut self, timings: bool) -> Self {
        self.config.listing.timings = timings;
        self
    }

    pub fn invoke_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.invoke.endpoint = Some(endpoint.into());
        self
    }

    pub fn invoke_clients(mut self, n: usize) -> Self {
        self.config.invoke.clients = n;
        self
    }

    pub fn invoke_mode(mut self, mode: InvocationMode) -> Self {
        self.config.invoke.mode = mode;
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
