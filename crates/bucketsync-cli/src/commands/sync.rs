//! Sync command - Upload changed files to the bucket
//!
//! Three input modes, chosen by the arguments:
//! 1. `bucketsync sync ROOT` walks the whole tree
//! 2. `bucketsync sync ROOT FILE...` uploads the named files
//! 3. `bucketsync sync ROOT --list-file LIST` uploads the files listed one per line
//!
//! File arguments and list lines may carry `#ACL=..,ContentType=..`
//! overrides. The final counters are always printed.

use std::path::{Path, PathBuf};
use anyhow::{Context as _, Result};
use clap::Args;
use tracing::info;

use bucketsync_core::config::ConfigBuilder;
use bucketsync_sync::{SyncCoordinator, SyncError, SyncOptions, SyncSummary};

use super::{connect, finish_config, limiter, Context};

/// Upload new and changed files
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Local directory that keys are derived from
    pub root: PathBuf,

    /// Files to upload instead of walking ROOT
    #[arg(conflicts_with = "list_file")]
    pub files: Vec<String>,

    /// Read files to upload from LIST, one per line
    #[arg(long, value_name = "LIST")]
    pub list_file: Option<PathBuf>,

    /// Remove the list file after a successful run
    #[arg(long, requires = "list_file")]
    pub tidy: bool,

    /// Connection string, overriding store.dsn
    #[arg(long)]
    pub dsn: Option<String>,

    /// Key prefix prepended to every uploaded key
    #[arg(long)]
    pub prefix: Option<String>,

    /// Canned ACL sent with every upload
    #[arg(long)]
    pub acl: Option<String>,

    /// Upload without comparing against the remote copy
    #[arg(long)]
    pub force: bool,

    /// Log what would be uploaded without uploading
    #[arg(long)]
    pub dry_run: bool,

    /// Concurrent uploads
    #[arg(long)]
    pub workers: Option<usize>,

    /// Only walk files with these extensions (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub extensions: Vec<String>,

    /// Abort retries when more than this percentage of uploads failed
    #[arg(long)]
    pub max_retry_percent: Option<f64>,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.format.formatter();
        let config = finish_config(self.apply(ctx.builder()))?;
        let (dsn, store) = connect(&config)?;

        info!(
            bucket = %dsn.bucket,
            root = %self.root.display(),
            dry_run = config.sync.dry_run,
            "Starting sync"
        );

        let coordinator = SyncCoordinator::new(
            store,
            limiter(&config),
            SyncOptions::from_config(&config),
            ctx.cancel.clone(),
        );

        let result = match (&self.list_file, self.files.is_empty()) {
            (Some(list), _) => coordinator.sync_file_list(list, &self.root).await,
            (None, false) => coordinator.sync_files(&self.files, &self.root).await,
            (None, true) => coordinator.sync_directory(&self.root).await,
        };

        match result {
            Ok(SyncSummary { stats, elapsed, cancelled }) => {
                formatter.stats(&stats, Some(elapsed));
                if cancelled {
                    formatter.warn("Sync cancelled");
                    return Ok(());
                }
                if stats.error > 0 {
                    formatter.warn(&format!("{} upload(s) failed", stats.error));
                }
                if self.tidy && !config.sync.dry_run && stats.error == 0 {
                    if let Some(list) = &self.list_file {
                        tidy(list)?;
                    }
                }
                Ok(())
            }
            Err(SyncError::ExcessiveFailures { percent, stats }) => {
                formatter.stats(&stats, None);
                formatter.error(&format!(
                    "{percent:.2}% of uploads failed, giving up without retrying"
                ));
                anyhow::bail!("E_EXCESSIVE_ERRORS")
            }
            Err(e) => Err(e.into()),
        }
    }

    fn apply(&self, mut builder: ConfigBuilder) -> ConfigBuilder {
        if let Some(dsn) = &self.dsn {
            builder = builder.dsn(dsn);
        }
        if let Some(prefix) = &self.prefix {
            builder = builder.prefix(prefix);
        }
        if let Some(acl) = &self.acl {
            builder = builder.acl(acl);
        }
        if self.force {
            builder = builder.force(true);
        }
        if self.dry_run {
            builder = builder.dry_run(true);
        }
        if let Some(workers) = self.workers {
            builder = builder.workers(workers).queue_capacity(workers.saturating_mul(4));
        }
        if !self.extensions.is_empty() {
            builder = builder.extensions(self.extensions.clone());
        }
        if let Some(percent) = self.max_retry_percent {
            builder = builder.max_retry_percent(percent);
        }
        builder
    }
}

fn tidy(list: &Path) -> Result<()> {
    std::fs::remove_file(list)
        .with_context(|| format!("Failed to remove list file {}", list.display()))?;
    info!(path = %list.display(), "Removed list file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(flatten)]
        sync: SyncCommand,
    }

    fn parse(args: &[&str]) -> SyncCommand {
        let mut argv = vec!["sync"];
        argv.extend_from_slice(args);
        Harness::try_parse_from(argv).unwrap().sync
    }

    #[test]
    fn test_overrides_reach_the_config() {
        let cmd = parse(&[
            "/data",
            "--dsn",
            "bucket=b",
            "--prefix",
            "out",
            "--workers",
            "3",
            "--extensions",
            "json,xml",
            "--max-retry-percent",
            "10",
            "--dry-run",
        ]);
        let config = finish_config(cmd.apply(ConfigBuilder::new())).unwrap();

        assert_eq!(config.store.dsn.as_deref(), Some("bucket=b"));
        assert_eq!(config.sync.prefix, "out");
        assert_eq!(config.sync.workers, 3);
        assert_eq!(config.sync.queue_capacity, 12);
        assert_eq!(config.sync.extensions, vec!["json", "xml"]);
        assert_eq!(config.sync.max_retry_percent, 10.0);
        assert!(config.sync.dry_run);
        assert!(!config.sync.force);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cmd = parse(&["/data", "--workers", "0"]);
        let err = finish_config(cmd.apply(ConfigBuilder::new())).unwrap_err();
        assert!(err.to_string().contains("sync.workers"));
    }

    #[test]
    fn test_files_conflict_with_list_file() {
        assert!(Harness::try_parse_from(["sync", "/data", "a.json", "--list-file", "l.txt"]).is_err());
        assert!(Harness::try_parse_from(["sync", "/data", "--tidy"]).is_err());
        let cmd = parse(&["/data", "--list-file", "l.txt", "--tidy"]);
        assert!(cmd.tidy);
        assert!(cmd.files.is_empty());
    }

    #[test]
    fn test_file_arguments_keep_override_suffix() {
        let cmd = parse(&["/data", "a.txt#ACL=private,ContentType=text/csv"]);
        assert_eq!(cmd.files, vec!["a.txt#ACL=private,ContentType=text/csv"]);

        let candidate = bucketsync_sync::Candidate::parse(&cmd.files[0], &cmd.root).unwrap();
        assert_eq!(candidate.path, PathBuf::from("/data/a.txt"));
        assert_eq!(candidate.overrides.acl.as_deref(), Some("private"));
        assert_eq!(candidate.overrides.content_type.as_deref(), Some("text/csv"));
    }

    #[test]
    fn test_tidy_removes_list() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.txt");
        std::fs::write(&list, "a.json\n").unwrap();

        tidy(&list).unwrap();
        assert!(!list.exists());
        assert!(tidy(&list).is_err());
    }
}
