use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use worklog_core::ConfigStore;
use worklog_sync::{
    FileStore, HttpConnector, RunLock, RunOutcome, StatusTracker, SyncOrchestrator,
};

use crate::engine::SyncEngine;
use crate::error::{io_err, DaemonError};
use crate::paths::{socket_path, store_root, worklog_root};
use crate::protocol::{Command, DaemonRequest, DaemonResponse};

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon with the HTTP fetcher and the file store under `home`.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    let config = ConfigStore::load_at(&home)?;
    let orchestrator = SyncOrchestrator::new(
        Arc::new(HttpConnector),
        Arc::new(FileStore::new(store_root(&home))),
        Arc::new(StatusTracker::new()),
    )
    .with_run_lock(RunLock::at_home(&home));
    let engine = Arc::new(SyncEngine::from_orchestrator(config, orchestrator));
    serve(home, engine).await
}

/// Host `engine` behind the control socket until `shutdown` or ctrl-c.
pub async fn serve(home: PathBuf, engine: Arc<SyncEngine>) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    engine.start().await;
    let started_at = Utc::now();
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let engine = engine.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                engine,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (socket_result, signal_result) = tokio::join!(socket_handle, signal_handle);
    engine.shutdown().await;

    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn socket_server_task(
    home: PathBuf,
    engine: Arc<SyncEngine>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at: DateTime<Utc>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let engine = engine.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) =
                        handle_socket_client(stream, home, engine, shutdown_tx, started_at).await
                    {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    engine: Arc<SyncEngine>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: DateTime<Utc>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let cmd = request.cmd;
        tracing::debug!(cmd = ?cmd, "control request");
        let response = match dispatch(&home, &engine, request, started_at).await {
            Ok(data) => DaemonResponse::ok(data),
            Err(err) => DaemonResponse::error(err.to_string()),
        };
        write_response(&mut writer, &response).await?;

        if cmd == Command::Shutdown {
            let _ = shutdown_tx.send(());
            break;
        }
    }

    Ok(())
}

async fn dispatch(
    home: &Path,
    engine: &SyncEngine,
    request: DaemonRequest,
    started_at: DateTime<Utc>,
) -> Result<Value, DaemonError> {
    match request.cmd {
        Command::Status => Ok(build_status_payload(home, engine, started_at).await),
        Command::Sync => Ok(outcome_payload(engine.force_sync().await?)),
        Command::Config => Ok(json!(engine.config().await.redacted())),
        Command::Configure => {
            let patch = request.config.ok_or_else(|| {
                DaemonError::Protocol("configure requires a `config` object".to_string())
            })?;
            let config = engine.update_config(patch).await?;
            Ok(json!({
                "config": config.redacted(),
                "scheduled": engine.is_scheduled().await,
                "nextSyncAt": engine.status().next_sync_at,
            }))
        }
        Command::Pause => {
            engine.stop_sync().await;
            Ok(json!({ "scheduled": false }))
        }
        Command::Clear => {
            engine.clear_data().await?;
            Ok(json!({ "cleared": true }))
        }
        Command::Shutdown => Ok(json!({ "stopping": true })),
    }
}

async fn build_status_payload(
    home: &Path,
    engine: &SyncEngine,
    started_at: DateTime<Utc>,
) -> Value {
    let config = engine.config().await.redacted();
    json!({
        "running": true,
        "pid": std::process::id(),
        "startedAt": started_at,
        "socket": socket_path(home).display().to_string(),
        "store": store_root(home).display().to_string(),
        "scheduled": engine.is_scheduled().await,
        "config": config,
        "status": engine.status(),
    })
}

fn outcome_payload(outcome: RunOutcome) -> Value {
    match outcome {
        RunOutcome::Completed(summary) => json!({ "outcome": "completed", "summary": summary }),
        RunOutcome::AlreadyRunning => json!({ "outcome": "alreadyRunning" }),
    }
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = worklog_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let mut payload = serde_json::to_string(response)?;
    payload.push('\n');
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// Install the global subscriber: `RUST_LOG` if set, else `info`.
/// `WORKLOG_LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("WORKLOG_LOG_FORMAT").is_ok_and(|format| format == "json");
    let _ = if json {
        fmt().json().with_env_filter(filter).try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use worklog_core::ConfigPatch;
    use worklog_sync::MemoryStore;

    #[test]
    fn stale_socket_file_is_removed_before_bind() {
        let home = TempDir::new().unwrap();
        let socket = socket_path(home.path());
        fs::create_dir_all(socket.parent().unwrap()).unwrap();
        fs::write(&socket, b"").unwrap();

        prepare_socket_for_bind(&socket).expect("stale socket cleared");
        assert!(!socket.exists());
    }

    #[test]
    fn already_running_outcome_has_a_stable_tag() {
        assert_eq!(
            outcome_payload(RunOutcome::AlreadyRunning),
            json!({ "outcome": "alreadyRunning" })
        );
    }

    #[tokio::test]
    async fn configure_without_patch_is_a_protocol_error() {
        let home = TempDir::new().unwrap();
        let engine = SyncEngine::new(
            ConfigStore::load_at(home.path()).unwrap(),
            Arc::new(HttpConnector),
            Arc::new(MemoryStore::new()),
        );
        let err = dispatch(
            home.path(),
            &engine,
            DaemonRequest::new(Command::Configure),
            Utc::now(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DaemonError::Protocol(_)));

        let data = dispatch(
            home.path(),
            &engine,
            DaemonRequest {
                cmd: Command::Configure,
                config: Some(ConfigPatch {
                    api_key: Some("secret".to_string()),
                    ..ConfigPatch::default()
                }),
            },
            Utc::now(),
        )
        .await
        .expect("configure");
        assert_eq!(data["config"]["apiKey"], json!("********"));
        assert_eq!(data["scheduled"], json!(false));
    }

    #[tokio::test]
    async fn status_payload_embeds_snapshot_and_redacted_config() {
        let home = TempDir::new().unwrap();
        let engine = SyncEngine::new(
            ConfigStore::load_at(home.path()).unwrap(),
            Arc::new(HttpConnector),
            Arc::new(MemoryStore::new()),
        );
        let payload = build_status_payload(home.path(), &engine, Utc::now()).await;
        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["status"]["isRunning"], json!(false));
        assert_eq!(payload["config"]["syncIntervalMinutes"], json!(30));
        assert!(payload["socket"].as_str().unwrap().ends_with("worklog.sock"));
    }
}
