//! `worklog daemon`: background scheduler lifecycle.

use anyhow::{Context, Result};
use clap::Subcommand;

use worklog_daemon::paths::socket_path;
use worklog_daemon::{request_pause, request_shutdown, request_status, start_blocking, DaemonError};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (scheduler + socket server).
    Start,
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Print daemon status as JSON.
    Status,
    /// Cancel scheduled runs until the config is next updated.
    Pause,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = super::home_dir()?;

    match command {
        DaemonCommand::Start => {
            start_blocking(&home).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_shutdown(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&home) {
            Ok(status) => super::print_json(&status)?,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                super::print_json(&serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                }))?;
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
        DaemonCommand::Pause => match request_pause(&home) {
            Ok(_) => println!("scheduled sync paused"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running; nothing is scheduled");
            }
            Err(err) => return Err(err).context("failed to pause daemon schedule"),
        },
    }

    Ok(())
}
