#[path = "common/mod.rs"]
mod common;

use assert_cmd::Command;
use common::write_config;
use predicates::prelude::*;
use tempfile::tempdir;

fn ppulse(home: &std::path::Path) -> Command {
    let bin = assert_cmd::cargo::cargo_bin!("ppulse");
    let mut cmd = Command::new(bin);
    cmd.env("HOME", home);
    cmd
}

#[test]
fn help_lists_subcommands() {
    let temp = tempdir().expect("tempdir");
    ppulse(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("collect"))
        .stdout(predicate::str::contains("history"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn unknown_subcommand_fails() {
    let temp = tempdir().expect("tempdir");
    ppulse(temp.path()).arg("explode").assert().failure();
}

#[test]
fn collect_reports_missing_config() {
    let temp = tempdir().expect("tempdir");
    ppulse(temp.path())
        .arg("collect")
        .arg("--config")
        .arg(temp.path().join("nope.yaml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config"));
}

#[test]
fn invalid_interval_is_rejected_up_front() {
    let temp = tempdir().expect("tempdir");
    let config = write_config(
        temp.path(),
        "version: \"1\"\nmonitor:\n  interval_minutes: 0\n",
    );

    ppulse(temp.path())
        .arg("collect")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid monitoring interval"));
}

#[test]
fn status_without_engine_succeeds_with_a_hint() {
    let temp = tempdir().expect("tempdir");
    ppulse(temp.path())
        .arg("status")
        .assert()
        .success()
        .stderr(predicate::str::contains("No running engine"));
}

#[test]
fn stop_without_engine_succeeds() {
    let temp = tempdir().expect("tempdir");
    ppulse(temp.path())
        .arg("stop")
        .assert()
        .success()
        .stderr(predicate::str::contains("nothing to stop"));
}

#[test]
fn logs_for_unknown_process_fail_cleanly() {
    let temp = tempdir().expect("tempdir");
    let config = write_config(
        temp.path(),
        "version: \"1\"\nsource:\n  kind: synthetic\n",
    );

    ppulse(temp.path())
        .arg("logs")
        .arg("ghost")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no log file for process 'ghost'"));
}

#[test]
fn purge_removes_state_directory() {
    let temp = tempdir().expect("tempdir");
    let state = common::state_dir(temp.path());
    std::fs::create_dir_all(&state).expect("create state dir");
    std::fs::write(state.join("ppulse.pid"), "1234").expect("seed state file");

    ppulse(temp.path())
        .arg("purge")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed"));
    assert!(!state.exists());

    ppulse(temp.path())
        .arg("purge")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to purge"));
}
