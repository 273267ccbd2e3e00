#[path = "common/mod.rs"]
mod common;

use std::fs;

use assert_cmd::Command;
use common::{history_dir, synthetic_config, write_config};
use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

fn ppulse(home: &std::path::Path) -> Command {
    let bin = assert_cmd::cargo::cargo_bin!("ppulse");
    let mut cmd = Command::new(bin);
    cmd.env("HOME", home);
    cmd
}

fn collect_json(home: &std::path::Path, config: &std::path::Path) -> Value {
    let output = ppulse(home)
        .arg("collect")
        .arg("--json")
        .arg("--config")
        .arg(config)
        .output()
        .expect("run ppulse collect");
    assert!(
        output.status.success(),
        "collect failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("parse collect json")
}

#[test]
fn synthetic_collect_scores_the_whole_fleet() {
    let temp = tempdir().expect("tempdir");
    let config = synthetic_config(temp.path());

    let report = collect_json(temp.path(), &config);
    let records = report["records"].as_array().expect("records array");
    assert_eq!(records.len(), 5);
    assert_eq!(report["skipped_entries"], 0);
    assert_eq!(report["rejected_writes"], 0);

    for record in records {
        let score = record["health_score"].as_f64().expect("score");
        assert!((0.0..=100.0).contains(&score), "score out of bounds: {score}");
        assert!(record["process_id"].is_string());
        assert!(record["collected_at"].is_string());
    }

    // Persistence was enabled, so every series landed on disk.
    let files: Vec<_> = fs::read_dir(history_dir(temp.path()))
        .expect("history dir")
        .flatten()
        .collect();
    assert_eq!(files.len(), 5);
}

#[test]
fn supervisor_payload_flows_through_the_pipeline() {
    let temp = tempdir().expect("tempdir");
    let fixture = temp.path().join("jlist.json");
    fs::write(
        &fixture,
        r#"[
            {
                "pm_id": 0,
                "name": "api-server",
                "monit": { "cpu": 95.0, "memory": 104857600 },
                "pm2_env": { "status": "online", "restart_time": 0, "pm_uptime": 0 }
            },
            {
                "pm_id": 1,
                "name": "worker",
                "monit": { "cpu": 0.0, "memory": 52428800 },
                "pm2_env": { "status": "stopped", "restart_time": 3 }
            },
            { "pm_id": 2, "name": "broken" }
        ]"#,
    )
    .expect("write fixture");

    let config = write_config(
        temp.path(),
        &format!(
            r#"
version: "1"
source:
  kind: supervisor
  command: ["cat", "{}"]
"#,
            fixture.display()
        ),
    );

    let report = collect_json(temp.path(), &config);
    let records = report["records"].as_array().expect("records array");
    assert_eq!(records.len(), 2);
    assert_eq!(report["skipped_entries"], 1);

    let api = &records[0];
    assert_eq!(api["name"], "api-server");
    // (95 - 80) * 1.5 penalty through the whole binary.
    assert_eq!(api["health_score"].as_f64(), Some(77.5));
    assert_eq!(api["is_healthy"], true);
    assert_eq!(api["issues"][0], "high-cpu");

    let worker = &records[1];
    assert_eq!(worker["is_healthy"], false);
    assert_eq!(worker["issues"][0], "not-online");
    assert!(worker["health_score"].as_f64().unwrap() <= 50.0);
}

#[test]
fn unreachable_supervisor_is_an_explicit_failure() {
    let temp = tempdir().expect("tempdir");
    let config = write_config(
        temp.path(),
        r#"
version: "1"
source:
  kind: supervisor
  command: ["false"]
"#,
    );

    ppulse(temp.path())
        .arg("collect")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unavailable"));
}

#[test]
fn hung_supervisor_hits_the_timeout() {
    let temp = tempdir().expect("tempdir");
    let config = write_config(
        temp.path(),
        r#"
version: "1"
source:
  kind: supervisor
  command: ["sleep", "30"]
  timeout_secs: 1
"#,
    );

    ppulse(temp.path())
        .arg("collect")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("timed out"));
}
