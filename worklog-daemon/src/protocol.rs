//! Newline-delimited JSON control protocol over the daemon's Unix socket.
//!
//! One request line in, one response line out. The client helpers below are
//! blocking; the CLI calls them directly.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use worklog_core::ConfigPatch;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// Control commands understood by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Status,
    Sync,
    Config,
    Configure,
    Pause,
    Clear,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: Command,
    /// Only read by `configure`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigPatch>,
}

impl DaemonRequest {
    pub fn new(cmd: Command) -> Self {
        Self { cmd, config: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Whether something is accepting connections on the daemon socket.
pub fn is_running(home: &Path) -> bool {
    let socket = socket_path(home);
    socket.exists() && UnixStream::connect(&socket).is_ok()
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;

    let mut payload = serde_json::to_string(request)?;
    payload.push('\n');
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    Ok(serde_json::from_str(line.trim_end())?)
}

/// Status snapshot. Retries briefly so a freshly spawned daemon has time to
/// bind its socket.
pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let request = DaemonRequest::new(Command::Status);
    let mut attempt = 0;
    loop {
        match send_request(home, &request) {
            Ok(response) => return response_into_data(response),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                attempt += 1;
                if attempt >= 5 {
                    return Err(err);
                }
                sleep(Duration::from_millis(100));
            }
            Err(err) => return Err(err),
        }
    }
}

pub fn request_sync(home: &Path) -> Result<Value, DaemonError> {
    simple(home, Command::Sync)
}

pub fn request_config(home: &Path) -> Result<Value, DaemonError> {
    simple(home, Command::Config)
}

pub fn request_configure(home: &Path, patch: ConfigPatch) -> Result<Value, DaemonError> {
    let response = send_request(
        home,
        &DaemonRequest {
            cmd: Command::Configure,
            config: Some(patch),
        },
    )?;
    response_into_data(response)
}

pub fn request_pause(home: &Path) -> Result<Value, DaemonError> {
    simple(home, Command::Pause)
}

pub fn request_clear(home: &Path) -> Result<Value, DaemonError> {
    simple(home, Command::Clear)
}

pub fn request_shutdown(home: &Path) -> Result<(), DaemonError> {
    simple(home, Command::Shutdown).map(|_| ())
}

fn simple(home: &Path, cmd: Command) -> Result<Value, DaemonError> {
    response_into_data(send_request(home, &DaemonRequest::new(cmd))?)
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn configure_request_carries_camel_case_patch() {
        let request = DaemonRequest {
            cmd: Command::Configure,
            config: Some(ConfigPatch {
                interval_minutes: Some(15),
                enabled: Some(true),
                ..ConfigPatch::default()
            }),
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(
            encoded,
            json!({"cmd": "configure", "config": {"syncIntervalMinutes": 15, "enabled": true}})
        );
    }

    #[test]
    fn bare_command_parses_without_config() {
        let request: DaemonRequest = serde_json::from_str(r#"{"cmd":"pause"}"#).unwrap();
        assert_eq!(request.cmd, Command::Pause);
        assert!(request.config.is_none());
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(serde_json::from_str::<DaemonRequest>(r#"{"cmd":"reboot"}"#).is_err());
    }

    #[test]
    fn error_response_becomes_protocol_error() {
        let err = response_into_data(DaemonResponse::error("a sync run is in progress"))
            .unwrap_err();
        assert!(matches!(err, DaemonError::Protocol(ref m) if m.contains("in progress")));
    }

    #[test]
    fn missing_socket_means_not_running() {
        let home = tempfile::TempDir::new().unwrap();
        assert!(!is_running(home.path()));
        let err = send_request(home.path(), &DaemonRequest::new(Command::Status)).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }));
    }
}
