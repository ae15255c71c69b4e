//! `worklog sync`: run once now, through the daemon when it is up.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use worklog_core::ConfigStore;
use worklog_daemon::{is_running, request_sync};
use worklog_sync::{RunOutcome, RunSummary};

use super::{home_dir, local_orchestrator, print_json};

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;

        let summary = if is_running(&home) {
            let data = request_sync(&home).context("sync failed")?;
            summary_from_daemon(data)?
        } else {
            let config = ConfigStore::load_at(&home)
                .context("failed to load config")?
                .get();
            let outcome = local_orchestrator(&home)
                .start_sync(&config)
                .context("sync failed")?;
            match outcome {
                RunOutcome::Completed(summary) => Some(summary),
                RunOutcome::AlreadyRunning => None,
            }
        };

        let Some(summary) = summary else {
            bail!("a sync run is in progress; try again when it finishes");
        };
        if self.json {
            print_json(&summary)?;
        } else {
            print_summary(&summary);
        }
        Ok(())
    }
}

fn summary_from_daemon(data: Value) -> Result<Option<RunSummary>> {
    if data["outcome"] == "alreadyRunning" {
        return Ok(None);
    }
    let summary = serde_json::from_value(data["summary"].clone())
        .context("daemon returned an unexpected sync payload")?;
    Ok(Some(summary))
}

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "records")]
    records: usize,
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} synced {} records in {} ms",
        "✓".green(),
        summary.total().to_string().bold(),
        summary.duration_ms
    );
    let rows: Vec<Row> = summary
        .counts
        .iter()
        .map(|(kind, records)| Row {
            kind: kind.to_string(),
            records: *records,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
