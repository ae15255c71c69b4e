//! Full round trip through the control socket.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;

use worklog_core::{ConfigPatch, ConfigStore, EntityKind, SyncConfig};
use worklog_daemon::{
    is_running, paths, request_clear, request_config, request_configure, request_pause,
    request_shutdown, request_status, request_sync, serve, DaemonError, SyncEngine,
};
use worklog_sync::{Connect, EntitySource, MemoryStore, SyncError, TimeWindow};

struct TwoOfEach;

impl EntitySource for TwoOfEach {
    fn fetch(&self, _kind: EntityKind, _window: &TimeWindow) -> Result<Vec<Value>, SyncError> {
        Ok(vec![json!({"id": 1}), json!({"id": 2})])
    }
}

impl Connect for TwoOfEach {
    fn connect(&self, _config: &SyncConfig) -> Result<Box<dyn EntitySource>, SyncError> {
        Ok(Box::new(TwoOfEach))
    }
}

async fn wait_for_socket(home: &Path) {
    for _ in 0..200 {
        if paths::socket_path(home).exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("daemon socket never appeared");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn control_commands_round_trip() {
    let home = TempDir::new().unwrap();
    let home_path = home.path().to_path_buf();
    let engine = Arc::new(SyncEngine::new(
        ConfigStore::load_at(&home_path).unwrap(),
        Arc::new(TwoOfEach),
        Arc::new(MemoryStore::new()),
    ));
    let server = tokio::spawn(serve(home_path.clone(), engine));
    wait_for_socket(&home_path).await;

    let client_home = home_path.clone();
    tokio::task::spawn_blocking(move || {
        let home = client_home.as_path();
        assert!(is_running(home));

        // Unconfigured: sync fails with a configuration error.
        let err = request_sync(home).unwrap_err();
        assert!(
            matches!(err, DaemonError::Protocol(ref m) if m.contains("configuration error")),
            "got {err:?}"
        );

        let configured = request_configure(
            home,
            ConfigPatch {
                api_url: Some("https://erm.test".to_string()),
                api_key: Some("K".to_string()),
                enabled: Some(true),
                ..ConfigPatch::default()
            },
        )
        .expect("configure");
        assert_eq!(configured["scheduled"], json!(true));
        assert_eq!(configured["config"]["apiKey"], json!("********"));

        let config = request_config(home).expect("config");
        assert_eq!(config["apiUrl"], json!("https://erm.test"));

        let synced = request_sync(home).expect("sync");
        assert_eq!(synced["outcome"], json!("completed"));
        assert_eq!(synced["summary"]["counts"]["timeEntries"], json!(2));

        let status = request_status(home).expect("status");
        assert_eq!(status["status"]["stats"]["users"], json!(2));
        assert_eq!(status["status"]["isRunning"], json!(false));
        assert_eq!(status["scheduled"], json!(true));

        request_pause(home).expect("pause");
        let status = request_status(home).expect("status");
        assert_eq!(status["scheduled"], json!(false));
        assert_eq!(status["status"]["nextSyncAt"], Value::Null);

        request_clear(home).expect("clear");
        let status = request_status(home).expect("status");
        assert_eq!(status["status"]["stats"], json!({}));

        request_shutdown(home).expect("shutdown");
    })
    .await
    .expect("client session");

    server.await.expect("join").expect("daemon exits cleanly");
    assert!(!paths::socket_path(&home_path).exists());

    // Config written through the socket is on disk.
    let reloaded = ConfigStore::load_at(&home_path).unwrap().get();
    assert!(reloaded.enabled);
    assert_eq!(reloaded.api_key, "K");
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn socket_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let home = TempDir::new().unwrap();
    let home_path = home.path().to_path_buf();
    let engine = Arc::new(SyncEngine::new(
        ConfigStore::load_at(&home_path).unwrap(),
        Arc::new(TwoOfEach),
        Arc::new(MemoryStore::new()),
    ));
    let server = tokio::spawn(serve(home_path.clone(), engine));
    wait_for_socket(&home_path).await;

    // chmod lands right after bind; allow it a moment.
    let socket = paths::socket_path(&home_path);
    let mut mode = 0;
    for _ in 0..100 {
        mode = std::fs::metadata(&socket).unwrap().permissions().mode() & 0o777;
        if mode == 0o600 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(mode, 0o600);

    let client_home = home_path.clone();
    tokio::task::spawn_blocking(move || request_shutdown(&client_home))
        .await
        .unwrap()
        .expect("shutdown");
    server.await.unwrap().unwrap();
}
