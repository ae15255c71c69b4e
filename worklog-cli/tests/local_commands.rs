//! Commands run without a daemon: they act on the config file and the file
//! store under `$HOME/.worklog`.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::Path;
use std::process::Command;
use std::thread;

use assert_cmd::prelude::*;
use predicates::str::contains;
use serde_json::{json, Value};
use tempfile::TempDir;

fn worklog_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("worklog"));
    cmd.env("HOME", home).env("USERPROFILE", home);
    cmd
}

fn json_output(home: &Path, args: &[&str]) -> Value {
    let output = worklog_cmd(home).args(args).output().expect("run worklog");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("JSON output")
}

/// Serves fixed JSON bodies keyed by request path, one response per connection.
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
            let (status, body) = match routes.get(path) {
                Some(body) => ("200 OK", body.to_string()),
                None => ("404 Not Found", "{}".to_string()),
            };
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    base_url
}

fn tracker_routes() -> HashMap<&'static str, Value> {
    HashMap::from([
        (
            "/users.json",
            json!({"users": [{"id": 1, "login": "ada"}, {"id": 2, "login": "grace"}]}),
        ),
        (
            "/projects.json",
            json!({"projects": [{"id": 7, "name": "Platform", "identifier": "platform"}]}),
        ),
        (
            "/enumerations/time_entry_activities.json",
            json!([{"id": 9, "name": "Development"}]),
        ),
        (
            "/time_entries.json",
            json!({"time_entries": [
                {"id": 100, "user": {"id": 1}, "project": {"id": 7}, "activity": {"id": 9}, "hours": 2.0},
                {"id": 101, "user": {"id": 2}, "project": {"id": 7}, "activity": {"id": 9}, "hours": 0.5}
            ]}),
        ),
    ])
}

#[test]
fn config_set_persists_and_show_redacts_the_key() {
    let home = TempDir::new().expect("home");

    worklog_cmd(home.path())
        .args([
            "config",
            "set",
            "--api-url",
            "https://tracker.example.com",
            "--api-key",
            "top-secret",
            "--interval",
            "15",
            "--enable",
        ])
        .assert()
        .success()
        .stdout(contains("config saved"));

    let shown = json_output(home.path(), &["config", "show", "--json"]);
    assert_eq!(shown["apiUrl"], json!("https://tracker.example.com"));
    assert_eq!(shown["apiKey"], json!("********"));
    assert_eq!(shown["syncIntervalMinutes"], json!(15));
    assert_eq!(shown["enabled"], json!(true));

    let on_disk =
        std::fs::read_to_string(home.path().join(".worklog/config.yaml")).expect("config file");
    assert!(on_disk.contains("apiKey: top-secret"), "got:\n{on_disk}");
}

#[test]
fn config_set_without_options_fails() {
    let home = TempDir::new().expect("home");
    worklog_cmd(home.path())
        .args(["config", "set"])
        .assert()
        .failure()
        .stderr(contains("nothing to change"));
}

#[test]
fn enable_and_disable_conflict() {
    let home = TempDir::new().expect("home");
    worklog_cmd(home.path())
        .args(["config", "set", "--enable", "--disable"])
        .assert()
        .failure();
}

#[test]
fn sync_without_config_reports_configuration_error() {
    let home = TempDir::new().expect("home");
    worklog_cmd(home.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(contains("configuration error"));
}

#[test]
fn local_sync_status_and_clear() {
    let home = TempDir::new().expect("home");
    let base_url = stub_tracker(tracker_routes());

    worklog_cmd(home.path())
        .args(["config", "set", "--api-url", &base_url, "--api-key", "K"])
        .assert()
        .success();

    let summary = json_output(home.path(), &["sync", "--json"]);
    assert_eq!(summary["counts"]["users"], json!(2));
    assert_eq!(summary["counts"]["timeEntries"], json!(2));

    let entry_path = home
        .path()
        .join(".worklog/store/time_entries/time_entry_100.json");
    let entry: Value =
        serde_json::from_str(&std::fs::read_to_string(entry_path).expect("stored entry"))
            .expect("entry JSON");
    assert_eq!(entry["projectId"], json!(7));
    assert_eq!(entry["hours"], json!(2.0));

    let status = json_output(home.path(), &["status", "--json"]);
    assert_eq!(status["running"], json!(false));
    assert_eq!(
        status["counts"],
        json!({"users": 2, "projects": 1, "activities": 1, "timeEntries": 2})
    );

    // Re-running replaces documents in place.
    json_output(home.path(), &["sync", "--json"]);
    let status = json_output(home.path(), &["status", "--json"]);
    assert_eq!(status["counts"]["users"], json!(2));

    worklog_cmd(home.path())
        .arg("clear")
        .assert()
        .success()
        .stdout(contains("cleared"));
    let status = json_output(home.path(), &["status", "--json"]);
    assert_eq!(
        status["counts"],
        json!({"users": 0, "projects": 0, "activities": 0, "timeEntries": 0})
    );
}

#[test]
fn remote_error_names_the_failing_phase() {
    let home = TempDir::new().expect("home");
    let mut routes = tracker_routes();
    routes.remove("/projects.json");
    let base_url = stub_tracker(routes);

    worklog_cmd(home.path())
        .args(["config", "set", "--api-url", &base_url, "--api-key", "K"])
        .assert()
        .success();

    worklog_cmd(home.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(contains("projects phase"))
        .stderr(contains("404"));

    let status = json_output(home.path(), &["status", "--json"]);
    assert_eq!(status["counts"]["users"], json!(2));
    assert_eq!(status["counts"]["projects"], json!(0));
}

#[test]
fn sync_and_clear_are_refused_while_another_process_holds_the_run_lock() {
    let home = TempDir::new().expect("home");
    let base_url = stub_tracker(tracker_routes());
    worklog_cmd(home.path())
        .args(["config", "set", "--api-url", &base_url, "--api-key", "K"])
        .assert()
        .success();
    json_output(home.path(), &["sync", "--json"]);

    let lock = worklog_sync::RunLock::at_home(home.path());
    let mut file = lock.open().expect("open run lock");
    let held = lock.try_hold(&mut file).expect("lock").expect("lock is free");

    worklog_cmd(home.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(contains("in progress"));
    worklog_cmd(home.path())
        .arg("clear")
        .assert()
        .failure()
        .stderr(contains("in progress"));

    let status = json_output(home.path(), &["status", "--json"]);
    assert_eq!(status["counts"]["users"], json!(2), "nothing cleared");

    drop(held);
    worklog_cmd(home.path()).arg("clear").assert().success();
    let status = json_output(home.path(), &["status", "--json"]);
    assert_eq!(status["counts"]["users"], json!(0));
}

#[test]
fn daemon_status_when_not_running() {
    let home = TempDir::new().expect("home");
    let status = json_output(home.path(), &["daemon", "status"]);
    assert_eq!(status["running"], json!(false));

    worklog_cmd(home.path())
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(contains("not running"));
}
