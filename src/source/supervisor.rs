//! Snapshot source backed by the external process supervisor.
use std::{
    io::Read,
    process::{Command, Stdio},
    sync::mpsc,
    thread,
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::{Collection, ProcessDataSource, ProcessSnapshot, ProcessStatus, SourceError};

/// Queries the supervisor's list command (PM2's `jlist` shape) and
/// normalizes the JSON payload into [`ProcessSnapshot`]s.
pub struct SupervisorBackedSource {
    command: Vec<String>,
    timeout: Duration,
    description: String,
}

impl SupervisorBackedSource {
    /// Creates a source that runs `command` with a bounded deadline.
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        let description = format!("supervisor ({})", command.join(" "));
        Self {
            command,
            timeout,
            description,
        }
    }

    /// Runs the list command, bounding the wait with the configured timeout.
    /// A hung supervisor is killed and reported as [`SourceError::Timeout`].
    fn run_query(&self) -> Result<String, SourceError> {
        let program = self.command.first().ok_or_else(|| SourceError::Unavailable {
            reason: "empty supervisor command".into(),
        })?;

        let mut child = Command::new(program)
            .args(&self.command[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let mut stdout = child.stdout.take().ok_or_else(|| SourceError::Unavailable {
            reason: "supervisor query produced no stdout handle".into(),
        })?;

        let (tx, rx) = mpsc::channel();
        let reader = thread::spawn(move || {
            let mut payload = String::new();
            let result = stdout.read_to_string(&mut payload).map(|_| payload);
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(payload)) => {
                // stdout hit EOF, so the child has closed its pipe; reap it.
                let status = child.wait()?;
                let _ = reader.join();
                if !status.success() {
                    return Err(SourceError::Unavailable {
                        reason: format!("supervisor query exited with {status}"),
                    });
                }
                Ok(payload)
            }
            Ok(Err(err)) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(SourceError::Spawn(err))
            }
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(SourceError::Timeout {
                    secs: self.timeout.as_secs(),
                })
            }
        }
    }
}

impl ProcessDataSource for SupervisorBackedSource {
    fn collect(&mut self) -> Result<Collection, SourceError> {
        let payload = self.run_query()?;
        normalize_payload(&payload, Utc::now())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Raw process entry as emitted by the supervisor's list command.
#[derive(Debug, Deserialize)]
struct RawProcess {
    pm_id: i64,
    name: String,
    #[serde(default)]
    monit: RawMonit,
    pm2_env: RawEnv,
}

#[derive(Debug, Default, Deserialize)]
struct RawMonit {
    #[serde(default)]
    cpu: f64,
    #[serde(default)]
    memory: u64,
}

#[derive(Debug, Deserialize)]
struct RawEnv {
    status: String,
    #[serde(default)]
    restart_time: u64,
    /// Millisecond epoch of the last process start.
    #[serde(default)]
    pm_uptime: Option<i64>,
}

/// Parses the supervisor payload. A malformed top-level document is total
/// failure; malformed individual entries are skipped and counted.
pub(crate) fn normalize_payload(
    payload: &str,
    collected_at: DateTime<Utc>,
) -> Result<Collection, SourceError> {
    let value: serde_json::Value = serde_json::from_str(payload.trim())?;
    let entries = value.as_array().ok_or_else(|| SourceError::Unavailable {
        reason: "expected a top-level process array".into(),
    })?;

    let mut snapshots = Vec::with_capacity(entries.len());
    let mut skipped = 0usize;
    for entry in entries {
        match normalize_entry(entry, collected_at) {
            Some(snapshot) => snapshots.push(snapshot),
            None => {
                skipped += 1;
                debug!("Skipping malformed supervisor entry: {entry}");
            }
        }
    }

    Ok(Collection { snapshots, skipped })
}

fn normalize_entry(
    entry: &serde_json::Value,
    collected_at: DateTime<Utc>,
) -> Option<ProcessSnapshot> {
    let raw: RawProcess = serde_json::from_value(entry.clone()).ok()?;
    let status: ProcessStatus = raw.pm2_env.status.parse().ok()?;

    let uptime_seconds = raw
        .pm2_env
        .pm_uptime
        .map(|started_ms| {
            let elapsed_ms = collected_at.timestamp_millis().saturating_sub(started_ms);
            (elapsed_ms.max(0) / 1000) as u64
        })
        .unwrap_or(0);

    Some(ProcessSnapshot {
        process_id: raw.pm_id.to_string(),
        name: raw.name,
        status,
        cpu_percent: raw.monit.cpu,
        memory_bytes: raw.monit.memory,
        uptime_seconds,
        restart_count: raw.pm2_env.restart_time,
        collected_at,
    })
}
