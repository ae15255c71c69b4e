//! `worklog config`: connection and schedule settings.

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use worklog_core::{config_store::config_path_at, ConfigPatch, ConfigStore, SyncConfig};
use worklog_daemon::{is_running, request_config, request_configure};

use super::{home_dir, print_json};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the current settings (API key redacted).
    Show {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Change one or more settings.
    Set(SetArgs),
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Base URL of the remote API, e.g. https://tracker.example.com
    #[arg(long)]
    pub api_url: Option<String>,

    #[arg(long)]
    pub api_key: Option<String>,

    /// Minutes between scheduled syncs.
    #[arg(long)]
    pub interval: Option<u32>,

    /// Days of time entries fetched per run.
    #[arg(long)]
    pub window_days: Option<u32>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Turn scheduled syncing on.
    #[arg(long, conflicts_with = "disable")]
    pub enable: bool,

    /// Turn scheduled syncing off.
    #[arg(long)]
    pub disable: bool,
}

impl SetArgs {
    fn into_patch(self) -> ConfigPatch {
        let enabled = match (self.enable, self.disable) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        ConfigPatch {
            api_url: self.api_url,
            api_key: self.api_key,
            interval_minutes: self.interval,
            enabled,
            time_entry_window_days: self.window_days,
            request_timeout_secs: self.timeout,
        }
    }
}

pub fn run(command: ConfigCommand) -> Result<()> {
    let home = home_dir()?;
    match command {
        ConfigCommand::Show { json } => {
            let config = if is_running(&home) {
                let data = request_config(&home).context("failed to read config from daemon")?;
                serde_json::from_value::<SyncConfig>(data)
                    .context("daemon returned an unexpected config payload")?
            } else {
                ConfigStore::load_at(&home)
                    .context("failed to load config")?
                    .get()
                    .redacted()
            };
            if json {
                print_json(&config)?;
            } else {
                print_table(&config);
            }
        }
        ConfigCommand::Set(args) => {
            let patch = args.into_patch();
            if patch.is_empty() {
                bail!("nothing to change; pass at least one option (see `worklog config set --help`)");
            }

            let config = if is_running(&home) {
                let data =
                    request_configure(&home, patch).context("daemon rejected the config update")?;
                serde_json::from_value::<SyncConfig>(data["config"].clone())
                    .context("daemon returned an unexpected config payload")?
            } else {
                let mut store = ConfigStore::load_at(&home).context("failed to load config")?;
                store.update(patch).context("failed to save config")?.redacted()
            };

            println!("{} {}", "✓".green(), "config saved".bold());
            if let Err(err) = config.validate() {
                println!("  {} {err}", "!".yellow());
            }
            print_table(&config);
        }
    }
    Ok(())
}

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "setting")]
    key: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

fn print_table(config: &SyncConfig) {
    let rows = vec![
        Row {
            key: "apiUrl",
            value: or_unset(&config.api_url),
        },
        Row {
            key: "apiKey",
            value: or_unset(&config.api_key),
        },
        Row {
            key: "syncIntervalMinutes",
            value: config.interval_minutes.to_string(),
        },
        Row {
            key: "enabled",
            value: config.enabled.to_string(),
        },
        Row {
            key: "timeEntryWindowDays",
            value: config.time_entry_window_days.to_string(),
        },
        Row {
            key: "requestTimeoutSecs",
            value: config.request_timeout_secs.to_string(),
        },
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    if let Some(home) = dirs::home_dir() {
        println!("{}", config_path_at(&home).display().to_string().bright_black());
    }
}

fn or_unset(value: &str) -> String {
    if value.is_empty() {
        "(not set)".to_string()
    } else {
        value.to_string()
    }
}
