//! Delete command - Recursively remove paths from the bucket
//!
//! Targets are numeric ids by default, mapped to their nested path
//! (`1159324849` -> `115/932/484/9`); `--paths` takes them as keys instead.
//! With `--invoke` each id is handed to a remote handler rather than deleted
//! locally.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::Args;
use tracing::{info, warn};

use bucketsync_core::config::{Config, ConfigBuilder};
use bucketsync_core::domain::{id_to_path, DomainError};
use bucketsync_core::ports::InvocationMode;
use bucketsync_store::HttpInvoker;
use bucketsync_sync::{InvokeFanout, ListOptions, Lister, SyncError};

use super::{connect, finish_config, limiter, Context};

/// Environment variable read when `--dsn` is not given
const DSN_ENV: &str = "DSN";

/// Recursively delete ids or paths
#[derive(Debug, Args)]
pub struct DeleteCommand {
    /// Ids (or keys with --paths) to delete
    pub targets: Vec<String>,

    /// Treat targets as keys rather than numeric ids
    #[arg(long)]
    pub paths: bool,

    /// Also read targets from standard input, one per line
    #[arg(long)]
    pub stdin: bool,

    /// Connection string; falls back to $DSN, then store.dsn
    #[arg(long)]
    pub dsn: Option<String>,

    /// Log what would be deleted without deleting
    #[arg(long)]
    pub dry_run: bool,

    /// Stop at the first failed child delete
    #[arg(long)]
    pub strict: bool,

    /// Hand each id to the remote invoke endpoint
    #[arg(long, conflicts_with = "paths")]
    pub invoke: bool,

    /// Invoke endpoint URL, overriding invoke.endpoint
    #[arg(long, requires = "invoke")]
    pub endpoint: Option<String>,

    /// Concurrent invocations
    #[arg(long, requires = "invoke")]
    pub clients: Option<usize>,

    /// Invocation mode: request-response or event
    #[arg(long, requires = "invoke")]
    pub mode: Option<InvocationMode>,
}

impl DeleteCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let mut raw = self.targets.clone();
        if self.stdin {
            raw.extend(read_lines(std::io::stdin().lock())?);
        }
        let config = finish_config(self.apply(ctx.builder(), std::env::var(DSN_ENV).ok()))?;

        if self.invoke {
            let ids = parse_ids(&raw)?;
            return self.execute_invoke(ctx, &config, ids).await;
        }

        let paths = if self.paths {
            clean_paths(&raw)
        } else {
            parse_ids(&raw)?
                .into_iter()
                .map(id_to_path)
                .collect::<Result<Vec<_>, _>>()?
        };
        self.execute_local(ctx, &config, paths).await
    }

    fn apply(&self, mut builder: ConfigBuilder, env_dsn: Option<String>) -> ConfigBuilder {
        if let Some(dsn) = self.dsn.clone().or(env_dsn) {
            builder = builder.dsn(dsn);
        }
        if self.dry_run {
            builder = builder.dry_run(true);
        }
        if self.strict {
            builder = builder.strict(true);
        }
        if let Some(endpoint) = &self.endpoint {
            builder = builder.invoke_endpoint(endpoint);
        }
        if let Some(clients) = self.clients {
            builder = builder.invoke_clients(clients);
        }
        if let Some(mode) = self.mode {
            builder = builder.invoke_mode(mode);
        }
        builder
    }

    async fn execute_local(&self, ctx: &Context, config: &Config, paths: Vec<String>) -> Result<()> {
        let formatter = ctx.format.formatter();
        let (dsn, store) = connect(config)?;
        let lister = Lister::new(
            store,
            limiter(config),
            ListOptions::from(&config.listing),
            ctx.cancel.clone(),
        )
        .with_dry_run(config.sync.dry_run);

        info!(bucket = %dsn.bucket, targets = paths.len(), "Starting delete");

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for path in paths {
            match lister.delete_recursive(&path).await {
                Ok(()) => deleted.push(path),
                Err(SyncError::Cancelled) => {
                    formatter.warn("Delete cancelled");
                    break;
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Delete failed");
                    failed.push((path, e.to_string()));
                }
            }
        }

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "deleted": deleted,
                "failed": failed
                    .iter()
                    .map(|(path, error)| serde_json::json!({ "path": path, "error": error }))
                    .collect::<Vec<_>>(),
                "dry_run": config.sync.dry_run,
            }));
            return Ok(());
        }

        let verb = if config.sync.dry_run { "Would delete" } else { "Deleted" };
        for path in &deleted {
            formatter.success(&format!("{verb} {path}"));
        }
        for (path, error) in &failed {
            formatter.error(&format!("{path}: {error}"));
        }
        Ok(())
    }

    async fn execute_invoke(&self, ctx: &Context, config: &Config, ids: Vec<i64>) -> Result<()> {
        let formatter = ctx.format.formatter();
        let dsn = config.dsn()?;
        let raw_dsn = config.store.dsn.clone().unwrap_or_default();
        let endpoint = config
            .invoke
            .endpoint
            .as_deref()
            .context("Missing invoke endpoint")?;

        let mut invoker = HttpInvoker::new(endpoint, raw_dsn, config.sync.dry_run)?;
        if let Some(token) = dsn.credentials.token()? {
            invoker = invoker.with_token(token);
        }

        let fanout = InvokeFanout::new(Arc::new(invoker), config.invoke.clients);
        let report = fanout.run(ids, config.invoke.mode, &ctx.cancel).await;

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "succeeded": report.succeeded,
                "failed": report
                    .failed
                    .iter()
                    .map(|(id, error)| serde_json::json!({ "id": id, "error": error }))
                    .collect::<Vec<_>>(),
                "cancelled": report.cancelled,
            }));
            return Ok(());
        }

        formatter.success(&format!(
            "Invoked {} id(s) with mode {}",
            report.succeeded, config.invoke.mode
        ));
        for (id, error) in &report.failed {
            formatter.error(&format!("{id}: {error}"));
        }
        if report.cancelled > 0 {
            formatter.warn(&format!("{} id(s) skipped after cancellation", report.cancelled));
        }
        Ok(())
    }
}

/// Reads non-empty trimmed lines
fn read_lines(reader: impl BufRead) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line.context("Failed to read standard input")?;
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    Ok(lines)
}

/// Parses every target as a positive id
fn parse_ids(raw: &[String]) -> Result<Vec<i64>> {
    let ids = raw
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<i64>() {
            Ok(id) if id > 0 => Ok(id),
            _ => Err(DomainError::InvalidId(s.to_string())),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if ids.is_empty() {
        bail!("Nothing to delete");
    }
    Ok(ids)
}

fn clean_paths(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|s| s.trim().trim_start_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
