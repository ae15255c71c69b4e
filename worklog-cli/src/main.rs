//! worklog: mirror a remote time tracker into a local store.
//!
//! # Usage
//!
//! ```text
//! worklog config show [--json]
//! worklog config set [--api-url URL] [--api-key KEY] [--interval MIN]
//!                    [--window-days N] [--timeout SECS] [--enable|--disable]
//! worklog sync [--json]
//! worklog status [--json]
//! worklog clear
//! worklog daemon start|stop|status|pause
//! ```
//!
//! Every command talks to the daemon when one is listening on
//! `~/.worklog/worklog.sock`, and otherwise works directly on the config file
//! and the local store.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand, daemon::DaemonCommand, status::StatusArgs, sync::SyncArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "worklog",
    version,
    about = "Sync users, projects, activities and time entries into a local store",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show or change connection and schedule settings.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Run one sync now.
    Sync(SyncArgs),

    /// Show run status, or local record counts when no daemon runs.
    Status(StatusArgs),

    /// Delete every locally stored record.
    Clear,

    /// Run or control the background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Config { command } => commands::config::run(command),
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Clear => commands::clear::run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
