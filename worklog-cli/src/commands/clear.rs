//! `worklog clear`: empty the four local collections.

use anyhow::{Context, Result};
use colored::Colorize;

use worklog_daemon::{is_running, request_clear};

use super::{home_dir, local_orchestrator};

pub fn run() -> Result<()> {
    let home = home_dir()?;
    if is_running(&home) {
        request_clear(&home).context("daemon could not clear local data")?;
    } else {
        local_orchestrator(&home)
            .clear_data()
            .context("failed to clear local data")?;
    }
    println!("{} local collections cleared", "✓".green());
    Ok(())
}
