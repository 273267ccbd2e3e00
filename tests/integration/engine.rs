#[path = "common/mod.rs"]
mod common;

use std::process::{Command as StdCommand, Stdio};

use assert_cmd::Command;
use common::{socket_path, synthetic_config, wait_for_exit, wait_for_path, wait_until};
use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

fn ppulse(home: &std::path::Path) -> Command {
    let bin = assert_cmd::cargo::cargo_bin!("ppulse");
    let mut cmd = Command::new(bin);
    cmd.env("HOME", home);
    cmd
}

fn json_output(home: &std::path::Path, args: &[&str]) -> Option<Value> {
    let output = ppulse(home).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    serde_json::from_slice(&output.stdout).ok()
}

#[test]
fn engine_lifecycle_over_the_control_socket() {
    let temp = tempdir().expect("tempdir");
    let home = temp.path();
    let config = synthetic_config(home);

    let bin = assert_cmd::cargo::cargo_bin!("ppulse");
    let mut engine = StdCommand::new(&bin)
        .arg("watch")
        .arg("--config")
        .arg(&config)
        .env("HOME", home)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn engine");

    wait_for_path(&socket_path(home));

    // The immediate first tick publishes a full summary.
    wait_until(
        || {
            json_output(home, &["status", "--json"])
                .map(|summary| summary["total"] == 5)
                .unwrap_or(false)
        },
        "first cycle to publish",
    );

    let summary = json_output(home, &["status", "--json"]).expect("status json");
    assert_eq!(summary["supervisor_available"], true);
    assert!(summary["generated_at"].is_string());
    assert_eq!(summary["processes"].as_array().map(|p| p.len()), Some(5));

    // A second engine instance must refuse to start.
    ppulse(home)
        .arg("watch")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already running"));

    // Manual collection routes through the resident engine.
    let report = json_output(home, &["collect", "--json"]).expect("collect json");
    assert_eq!(report["records"].as_array().map(|r| r.len()), Some(5));

    // History accumulated both cycles for a fleet process.
    let records =
        json_output(home, &["history", "api-server", "--json"]).expect("history json");
    let records = records.as_array().expect("records array").clone();
    assert!(records.len() >= 2);
    let stamps: Vec<chrono::DateTime<chrono::Utc>> = records
        .iter()
        .map(|r| r["collected_at"].as_str().unwrap().parse().unwrap())
        .collect();
    assert!(
        stamps.windows(2).all(|pair| pair[0] < pair[1]),
        "history must be strictly ordered"
    );

    // Stopping the scheduler keeps the cached summary readable.
    let session = json_output(home, &["stop", "--json"]).expect("stop json");
    assert_eq!(session["state"], "stopped");
    let summary = json_output(home, &["status", "--json"]).expect("status json");
    assert_eq!(summary["total"], 5);

    // Restart is idempotent: two starts leave one running session.
    let session = json_output(home, &["start", "--interval", "1", "--json"])
        .expect("start json");
    assert_eq!(session["state"], "running");
    let session = json_output(home, &["start", "--interval", "1", "--json"])
        .expect("second start json");
    assert_eq!(session["state"], "running");
    assert_eq!(session["interval_minutes"], 1);

    ppulse(home)
        .arg("shutdown")
        .assert()
        .success()
        .stdout(predicate::str::contains("shutting down"));

    let status = wait_for_exit(&mut engine);
    assert!(status.success(), "engine exited with {status:?}");
    assert!(!socket_path(home).exists(), "socket must be cleaned up");
}
