#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// State directory the engine uses for a given HOME.
pub fn state_dir(home: &Path) -> PathBuf {
    home.join(".local/share/procpulse")
}

/// Control socket path for a given HOME.
pub fn socket_path(home: &Path) -> PathBuf {
    state_dir(home).join("control.sock")
}

/// Persisted history directory for a given HOME.
pub fn history_dir(home: &Path) -> PathBuf {
    state_dir(home).join("history")
}

/// Writes a config file into `dir` and returns its path.
pub fn write_config(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("procpulse.yaml");
    fs::write(&path, contents).expect("write config");
    path
}

/// Synthetic-source config with persistence enabled.
pub fn synthetic_config(dir: &Path) -> PathBuf {
    write_config(
        dir,
        r#"
version: "1"
source:
  kind: synthetic
  seed: 42
monitor:
  interval_minutes: 1
persistence:
  enabled: true
"#,
    )
}

pub fn wait_for_path(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if path.exists() {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }
    panic!("Timed out waiting for {:?} to exist", path);
}

/// Polls `check` until it passes or the deadline expires.
pub fn wait_until<F: FnMut() -> bool>(mut check: F, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if check() {
            return;
        }
        if Instant::now() >= deadline {
            panic!("Timed out waiting for {what}");
        }
        thread::sleep(Duration::from_millis(100));
    }
}

/// Waits for a spawned child to exit, with a deadline.
pub fn wait_for_exit(child: &mut std::process::Child) -> std::process::ExitStatus {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(status) = child.try_wait().expect("poll child") {
            return status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("Timed out waiting for child to exit");
        }
        thread::sleep(Duration::from_millis(100));
    }
}
