//! Config command - View, change and validate the configuration file
//!
//! `show` prints the effective configuration (YAML, or JSON with `--json`).
//! `set` changes one dotted key and saves the file after validating it.
//! `validate` loads the file strictly and reports every problem found.

use std::path::Path;

use anyhow::{bail, Context as _, Result};
use clap::Subcommand;
use tracing::info;

use bucketsync_core::config::Config;

use super::Context;
use crate::output::plural;

/// Keys accepted by `config set`
const SETTABLE_KEYS: &[&str] = &[
    "store.dsn",
    "sync.workers",
    "sync.queue_capacity",
    "sync.prefix",
    "sync.acl",
    "sync.max_retry_percent",
    "sync.status_interval_secs",
    "sync.extensions",
    "rate_limiting.requests_per_minute",
    "rate_limiting.max_attempts",
    "rate_limiting.initial_backoff_ms",
    "rate_limiting.backoff_growth_percent",
    "rate_limiting.max_backoff_ms",
    "listing.max_keys",
    "listing.strict",
    "invoke.endpoint",
    "invoke.clients",
    "invoke.mode",
    "logging.level",
];

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.workers")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        match self {
            ConfigCommand::Show => show(ctx),
            ConfigCommand::Set { key, value } => set(ctx, key, value),
            ConfigCommand::Validate => validate(ctx),
        }
    }
}

fn show(ctx: &Context) -> Result<()> {
    let formatter = ctx.format.formatter();
    info!(config_path = %ctx.config_path.display(), "Showing configuration");

    if ctx.format.is_json() {
        let json = serde_json::to_value(&ctx.config)
            .context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
        return Ok(());
    }

    formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
    formatter.info("");
    let yaml = serde_yaml::to_string(&ctx.config)
        .context("Failed to serialize configuration to YAML")?;
    for line in yaml.lines() {
        formatter.info(line);
    }
    Ok(())
}

fn set(ctx: &Context, key: &str, value: &str) -> Result<()> {
    let formatter = ctx.format.formatter();
    let mut config = ctx.config.clone();

    info!(key = %key, "Setting configuration value");

    if let Err(e) = apply_config_value(&mut config, key, value) {
        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": false,
                "key": key,
                "error": e.to_string(),
            }));
        } else {
            formatter.error(&format!("Failed to set '{key}': {e}"));
            formatter.info("");
            formatter.info("Supported keys:");
            for supported in SETTABLE_KEYS {
                formatter.info(&format!("  {supported}"));
            }
        }
        return Ok(());
    }

    let errors: Vec<String> = config.validate().iter().map(ToString::to_string).collect();
    if !errors.is_empty() {
        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": false,
                "key": key,
                "errors": errors,
            }));
        } else {
            formatter.error(&format!("Invalid value for '{key}': {}", errors.join("; ")));
        }
        return Ok(());
    }

    save(&config, &ctx.config_path)?;

    if ctx.format.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "key": key,
            "config_path": ctx.config_path.display().to_string(),
        }));
    } else {
        formatter.success(&format!("Set {key}"));
        formatter.info(&format!("Saved to {}", ctx.config_path.display()));
    }
    Ok(())
}

fn validate(ctx: &Context) -> Result<()> {
    let formatter = ctx.format.formatter();
    let path = &ctx.config_path;

    // Load strictly: a parse error must be reported, not replaced by defaults
    let config = match Config::load(path) {
        Ok(config) => config,
        Err(e) => {
            let message = if path.exists() {
                format!("Failed to parse configuration: {e:#}")
            } else {
                "Configuration file not found, using defaults".to_string()
            };
            if ctx.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": path.display().to_string(),
                    "errors": [message],
                }));
            } else {
                formatter.error(&message);
                formatter.info(&format!("File: {}", path.display()));
            }
            return Ok(());
        }
    };

    info!(config_path = %path.display(), "Validating configuration");
    let errors = config.validate();

    if ctx.format.is_json() {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": path.display().to_string(),
            "errors": messages,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            plural(errors.len())
        ));
        formatter.info(&format!("File: {}", path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }
    Ok(())
}

fn save(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
    }
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write configuration file {}", path.display()))
}

/// Applies a dot-notation key/value pair to `config`
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    fn number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
        value
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("Expected a number for {key}, got '{value}'"))
    }

    match key {
        "store.dsn" => config.store.dsn = Some(value.to_string()).filter(|v| !v.is_empty()),
        "sync.workers" => config.sync.workers = number(key, value)?,
        "sync.queue_capacity" => config.sync.queue_capacity = number(key, value)?,
        "sync.prefix" => config.sync.prefix = value.to_string(),
        "sync.acl" => config.sync.acl = value.to_string(),
        "sync.max_retry_percent" => config.sync.max_retry_percent = number(key, value)?,
        "sync.status_interval_secs" => config.sync.status_interval_secs = number(key, value)?,
        "sync.extensions" => {
            config.sync.extensions = value
                .split(',')
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect();
        }
        "rate_limiting.requests_per_minute" => {
            config.rate_limiting.requests_per_minute = number(key, value)?;
        }
        "rate_limiting.max_attempts" => config.rate_limiting.max_attempts = number(key, value)?,
        "rate_limiting.initial_backoff_ms" => {
            config.rate_limiting.initial_backoff_ms = number(key, value)?;
        }
        "rate_limiting.backoff_growth_percent" => {
            config.rate_limiting.backoff_growth_percent = number(key, value)?;
        }
        "rate_limiting.max_backoff_ms" => config.rate_limiting.max_backoff_ms = number(key, value)?,
        "listing.max_keys" => config.listing.max_keys = number(key, value)?,
        "listing.strict" => {
            config.listing.strict = value
                .parse()
                .map_err(|_| anyhow::anyhow!("Expected true or false for {key}, got '{value}'"))?;
        }
        "invoke.endpoint" => config.invoke.endpoint = Some(value.to_string()).filter(|v| !v.is_empty()),
        "invoke.clients" => config.invoke.clients = number(key, value)?,
        "invoke.mode" => config.invoke.mode = value.parse()?,
        "logging.level" => config.logging.level = value.to_string(),
        other => bail!("Unknown configuration key: {other}"),
    }
    Ok(())
}
