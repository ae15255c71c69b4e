//! The real `worklog daemon start` process, driven through the CLI.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, sleep};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tempfile::TempDir;

fn worklog_bin() -> PathBuf {
    assert_cmd::cargo::cargo_bin!("worklog").to_path_buf()
}

fn worklog(home: &Path, args: &[&str]) -> std::process::Output {
    Command::new(worklog_bin())
        .env("HOME", home)
        .env("USERPROFILE", home)
        .args(args)
        .output()
        .expect("run worklog")
}

struct DaemonProcess {
    child: Child,
    home: PathBuf,
}

impl DaemonProcess {
    fn start(home: PathBuf) -> Self {
        let child = Command::new(worklog_bin())
            .env("HOME", &home)
            .env("USERPROFILE", &home)
            .args(["daemon", "start"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");
        Self { child, home }
    }

    fn stop(&mut self) {
        let _ = worklog(&self.home, &["daemon", "stop"]);

        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            sleep(Duration::from_millis(50));
        }

        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

fn daemon_status(home: &Path) -> Option<Value> {
    let output = worklog(home, &["daemon", "status"]);
    if !output.status.success() {
        return None;
    }
    serde_json::from_slice(&output.stdout).ok()
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

fn stub_tracker(routes: HashMap<&'static str, Value>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            let _ = reader.read_line(&mut request_line);
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                    break;
                }
            }
            let target = request_line.split_whitespace().nth(1).unwrap_or("/");
            let path = target.split('?').next().unwrap_or("/");
            let body = routes.get(path).cloned().unwrap_or_else(|| json!({}));
            let body = body.to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    base_url
}

#[test]
fn daemon_routes_config_sync_and_status() {
    let home = TempDir::new().expect("home");
    let base_url = stub_tracker(HashMap::from([
        ("/users.json", json!({"users": [{"id": 1}]})),
        ("/projects.json", json!({"projects": [{"id": 2}, {"id": 3}]})),
        (
            "/enumerations/time_entry_activities.json",
            json!({"time_entry_activities": [{"id": 4}]}),
        ),
        ("/time_entries.json", json!({"time_entries": []})),
    ]));

    let mut daemon = DaemonProcess::start(home.path().to_path_buf());
    assert!(
        wait_until(Duration::from_secs(5), || daemon_status(home.path())
            .map(|status| status["running"] == true)
            .unwrap_or(false)),
        "daemon did not report running state in time",
    );

    let set = worklog(
        home.path(),
        &[
            "config", "set", "--api-url", &base_url, "--api-key", "K", "--interval", "60",
            "--enable",
        ],
    );
    assert!(
        set.status.success(),
        "config set failed: {}",
        String::from_utf8_lossy(&set.stderr)
    );

    let status = daemon_status(home.path()).expect("status");
    assert_eq!(status["scheduled"], json!(true));
    assert!(status["status"]["nextSyncAt"].is_string());
    assert_eq!(status["config"]["apiKey"], json!("********"));

    let sync = worklog(home.path(), &["sync", "--json"]);
    assert!(
        sync.status.success(),
        "sync failed: {}",
        String::from_utf8_lossy(&sync.stderr)
    );
    let summary: Value = serde_json::from_slice(&sync.stdout).expect("summary JSON");
    assert_eq!(summary["counts"]["projects"], json!(2));

    let status = worklog(home.path(), &["status", "--json"]);
    let status: Value = serde_json::from_slice(&status.stdout).expect("status JSON");
    assert_eq!(status["running"], json!(true));
    assert_eq!(
        status["status"]["stats"],
        json!({"users": 1, "projects": 2, "activities": 1, "timeEntries": 0})
    );
    assert!(status["status"]["lastSyncAt"].is_string());

    let pause = worklog(home.path(), &["daemon", "pause"]);
    assert!(pause.status.success());
    let status = daemon_status(home.path()).expect("status");
    assert_eq!(status["scheduled"], json!(false));

    assert!(home
        .path()
        .join(".worklog/store/projects/project_3.json")
        .exists());

    daemon.stop();
    assert!(
        wait_until(Duration::from_secs(2), || !home
            .path()
            .join(".worklog/worklog.sock")
            .exists()),
        "socket should be removed on shutdown"
    );
}
