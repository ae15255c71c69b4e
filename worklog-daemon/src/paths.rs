use std::path::{Path, PathBuf};

pub use worklog_core::config_store::worklog_root;

pub const DAEMON_SOCKET: &str = "worklog.sock";

pub fn socket_path(home: &Path) -> PathBuf {
    worklog_root(home).join(DAEMON_SOCKET)
}

pub fn store_root(home: &Path) -> PathBuf {
    worklog_root(home).join("store")
}
