#[path = "common/mod.rs"]
mod common;

use assert_cmd::Command;
use chrono::{DateTime, Utc};
use common::{history_dir, synthetic_config};
use serde_json::Value;
use tempfile::tempdir;

fn ppulse(home: &std::path::Path) -> Command {
    let bin = assert_cmd::cargo::cargo_bin!("ppulse");
    let mut cmd = Command::new(bin);
    cmd.env("HOME", home);
    cmd
}

fn run_json(home: &std::path::Path, args: &[&str]) -> Value {
    let output = ppulse(home).args(args).output().expect("run ppulse");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("parse json")
}

fn collect(home: &std::path::Path, config: &std::path::Path) {
    ppulse(home)
        .arg("collect")
        .arg("--config")
        .arg(config)
        .assert()
        .success();
}

#[test]
fn persisted_history_spans_separate_invocations() {
    let temp = tempdir().expect("tempdir");
    let home = temp.path();
    let config = synthetic_config(home);

    // Two one-shot cycles in two separate processes; persistence stitches
    // them into one series.
    collect(home, &config);
    collect(home, &config);
    assert!(history_dir(home).exists());

    let config_arg = config.to_string_lossy().to_string();
    let records = run_json(
        home,
        &["history", "api-server", "--json", "--config", &config_arg],
    );
    let records = records.as_array().expect("records array").clone();
    assert_eq!(records.len(), 2);

    let stamps: Vec<DateTime<Utc>> = records
        .iter()
        .map(|r| r["collected_at"].as_str().unwrap().parse().unwrap())
        .collect();
    assert!(stamps[0] < stamps[1]);

    // Limit keeps the newest record.
    let limited = run_json(
        home,
        &[
            "history",
            "api-server",
            "--json",
            "--limit",
            "1",
            "--config",
            &config_arg,
        ],
    );
    let limited = limited.as_array().expect("records array").clone();
    assert_eq!(limited.len(), 1);
    let newest: DateTime<Utc> = limited[0]["collected_at"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(newest, stamps[1]);

    // The same series is reachable by supervisor identifier.
    let by_id = run_json(
        home,
        &[
            "history",
            "0",
            "--id",
            "--json",
            "--config",
            &config_arg,
        ],
    );
    assert_eq!(by_id.as_array().map(|r| r.len()), Some(2));

    // A one-minute trailing window catches both fresh cycles.
    let windowed = run_json(
        home,
        &[
            "history",
            "api-server",
            "--json",
            "--since-minutes",
            "1",
            "--config",
            &config_arg,
        ],
    );
    assert_eq!(windowed.as_array().map(|r| r.len()), Some(2));
}

#[test]
fn history_for_unknown_process_is_empty() {
    let temp = tempdir().expect("tempdir");
    let home = temp.path();
    let config = synthetic_config(home);
    collect(home, &config);

    let config_arg = config.to_string_lossy().to_string();
    let records = run_json(
        home,
        &["history", "ghost", "--json", "--config", &config_arg],
    );
    assert_eq!(records.as_array().map(|r| r.len()), Some(0));
}
