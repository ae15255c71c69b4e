//! Daemon hosting one [`SyncEngine`]: schedule, control socket, ctrl-c.

pub mod engine;
mod error;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod scheduler;

pub use engine::SyncEngine;
pub use error::DaemonError;
pub use protocol::{
    is_running, request_clear, request_config, request_configure, request_pause, request_shutdown,
    request_status, request_sync, send_request, Command, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, serve, start_blocking};
pub use scheduler::Scheduler;
