//! List command - Print the objects under a prefix
//!
//! One object per line: tab-separated key, size, last-modified time and
//! ETag, or one JSON object per line with `--json`. Entries of a page are
//! handled concurrently, so their order within a page is not fixed.

use anyhow::Result;
use clap::Args;
use tracing::info;

use bucketsync_core::config::ConfigBuilder;
use bucketsync_core::domain::ObjectEntry;
use bucketsync_sync::{ListOptions, Lister, SyncError};

use super::{connect, finish_config, limiter, Context};
use crate::output::plural;

/// List objects under a prefix
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Key prefix; empty lists the whole connection
    #[arg(default_value = "")]
    pub prefix: String,

    /// Connection string, overriding store.dsn
    #[arg(long)]
    pub dsn: Option<String>,

    /// Keys requested per page
    #[arg(long)]
    pub max_keys: Option<usize>,

    /// Log progress every 10 seconds and the total time
    #[arg(long)]
    pub timings: bool,
}

impl ListCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.format.formatter();
        let config = finish_config(self.apply(ctx.builder()))?;
        let (dsn, store) = connect(&config)?;
        let lister = Lister::new(
            store,
            limiter(&config),
            ListOptions::from(&config.listing),
            ctx.cancel.clone(),
        );

        info!(bucket = %dsn.bucket, prefix = %self.prefix, "Listing");

        let json = ctx.format.is_json();
        let result = lister
            .list(&self.prefix, move |entry| async move {
                println!("{}", render(&entry, json));
                Ok(())
            })
            .await;

        match result {
            Ok(report) => {
                let items = usize::try_from(report.items).unwrap_or(usize::MAX);
                formatter.info(&format!(
                    "{} object{} in {} page{}",
                    report.items,
                    plural(items),
                    report.pages,
                    plural(usize::try_from(report.pages).unwrap_or(usize::MAX))
                ));
                Ok(())
            }
            Err(SyncError::Cancelled) => {
                formatter.warn("Listing cancelled");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn apply(&self, mut builder: ConfigBuilder) -> ConfigBuilder {
        if let Some(dsn) = &self.dsn {
            builder = builder.dsn(dsn);
        }
        if let Some(max_keys) = self.max_keys {
            builder = builder.max_keys(max_keys);
        }
        if self.timings {
            builder = builder.timings(true);
        }
        builder
    }
}

fn render(entry: &ObjectEntry, json: bool) -> String {
    if json {
        serde_json::to_string(entry).unwrap_or_else(|_| entry.key.clone())
    } else {
        entry.to_string()
    }
}
