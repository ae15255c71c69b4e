//! `worklog status`: run state from the daemon, or store counts offline.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde_json::{json, Value};
use tabled::{settings::Style, Table, Tabled};

use worklog_core::{ConfigStore, EntityKind};
use worklog_daemon::{is_running, request_status};
use worklog_sync::{FileStore, LocalUpsertSink, SyncStatus};

use super::{home_dir, print_json};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;

        if is_running(&home) {
            let payload = request_status(&home).context("failed to query daemon status")?;
            if self.json {
                return print_json(&payload);
            }
            let status: SyncStatus = serde_json::from_value(payload["status"].clone())
                .context("daemon returned an unexpected status payload")?;
            print_daemon_status(&payload, &status);
        } else {
            let payload = local_payload(&home)?;
            if self.json {
                return print_json(&payload);
            }
            print_local_status(&payload);
        }
        Ok(())
    }
}

fn local_payload(home: &Path) -> Result<Value> {
    let config = ConfigStore::load_at(home)
        .context("failed to load config")?
        .get()
        .redacted();
    let store = FileStore::at_home(home);
    let mut counts = BTreeMap::new();
    for kind in EntityKind::ALL {
        let count = store
            .count(kind.collection())
            .with_context(|| format!("failed to count {}", kind.collection()))?;
        counts.insert(kind, count);
    }
    Ok(json!({
        "running": false,
        "store": store.root().display().to_string(),
        "config": config,
        "counts": counts,
    }))
}

#[derive(Tabled)]
struct KindRow {
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "progress")]
    progress: String,
    #[tabled(rename = "records")]
    records: String,
}

fn print_daemon_status(payload: &Value, status: &SyncStatus) {
    let state = if status.is_running {
        match status.current_phase {
            Some(kind) => format!("running ({kind})").yellow().bold(),
            None => "running".yellow().bold(),
        }
    } else if status.last_error.is_some() {
        "failed".red().bold()
    } else {
        "idle".green().bold()
    };
    println!(
        "worklog v{} | daemon pid {} | {}",
        env!("CARGO_PKG_VERSION"),
        payload["pid"],
        state
    );
    println!("  last sync: {}", format_time(status.last_sync_at));
    let next = if payload["scheduled"] == true {
        format_time(status.next_sync_at)
    } else {
        "not scheduled".to_string()
    };
    println!("  next sync: {next}");
    if let Some(ms) = status.last_run_duration_ms {
        println!("  last run:  {ms} ms");
    }
    if let Some(error) = &status.last_error {
        println!("  {} {}", "error:".red().bold(), error);
    }

    let rows: Vec<KindRow> = EntityKind::ALL
        .iter()
        .map(|kind| KindRow {
            kind: kind.to_string(),
            progress: status
                .progress
                .get(kind)
                .map(|p| format!("{p}%"))
                .unwrap_or_else(|| "-".to_string()),
            records: status
                .stats
                .get(kind)
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "collection")]
    collection: String,
    #[tabled(rename = "stored")]
    stored: u64,
}

fn print_local_status(payload: &Value) {
    println!(
        "worklog v{} | {} | store {}",
        env!("CARGO_PKG_VERSION"),
        "daemon not running".bright_black(),
        payload["store"].as_str().unwrap_or_default()
    );
    let rows: Vec<CountRow> = EntityKind::ALL
        .iter()
        .map(|kind| CountRow {
            collection: kind.collection().to_string(),
            stored: payload["counts"][kind.to_string()].as_u64().unwrap_or(0),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    if payload["config"]["enabled"] != true {
        println!("Scheduled sync is disabled. Run 'worklog config set --enable' and 'worklog daemon start'.");
    }
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    let Some(at) = at else {
        return "never".to_string();
    };
    let delta = at.signed_duration_since(Utc::now());
    let minutes = delta.num_minutes();
    let relative = match minutes {
        0 => "now".to_string(),
        m if m > 0 => format!("in {m} min"),
        m => format!("{} min ago", -m),
    };
    format!("{} ({relative})", at.format("%Y-%m-%d %H:%M:%S UTC"))
}
