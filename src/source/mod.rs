//! Snapshot sources for supervised process data.
//!
//! The engine is written once against the [`ProcessDataSource`] trait; the
//! variant (real supervisor or synthetic fleet) is chosen at startup from
//! configuration and injected into the monitor.

mod supervisor;
mod synthetic;

pub use supervisor::SupervisorBackedSource;
pub use synthetic::SyntheticSource;

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum_macros::AsRefStr;
use thiserror::Error;

/// Lifecycle state reported by the supervisor for one process.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Default,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ProcessStatus {
    /// Process is running normally.
    Online,
    /// Process has been stopped.
    #[default]
    Stopped,
    /// Process is shutting down.
    Stopping,
    /// Process crashed and is waiting for the supervisor to restart it.
    WaitingRestart,
    /// Process is being launched.
    Launching,
    /// Process exceeded its restart budget and gave up.
    Errored,
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl FromStr for ProcessStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // PM2 reports "waiting restart" with a space; accept both spellings.
        match s.trim().to_lowercase().as_str() {
            "online" => Ok(ProcessStatus::Online),
            "stopped" => Ok(ProcessStatus::Stopped),
            "stopping" => Ok(ProcessStatus::Stopping),
            "waiting-restart" | "waiting restart" => Ok(ProcessStatus::WaitingRestart),
            "launching" => Ok(ProcessStatus::Launching),
            "errored" => Ok(ProcessStatus::Errored),
            other => Err(format!("unknown process status '{other}'")),
        }
    }
}

/// One process's instantaneous state at collection time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    /// Stable identifier assigned by the supervisor. Unique among running
    /// processes, but may be reused after a process is removed and re-added.
    pub process_id: String,
    /// Process name; not guaranteed unique.
    pub name: String,
    /// Supervisor-reported lifecycle state.
    pub status: ProcessStatus,
    /// CPU usage, 0-100 normalized. May exceed 100 under multi-core
    /// saturation; never clamped here, clamp only for display.
    pub cpu_percent: f64,
    /// Resident memory in bytes.
    pub memory_bytes: u64,
    /// Seconds since the last (re)start.
    pub uptime_seconds: u64,
    /// Restart counter; non-decreasing while the identifier is stable.
    pub restart_count: u64,
    /// When this snapshot was taken.
    pub collected_at: DateTime<Utc>,
}

impl ProcessSnapshot {
    /// Stable hash over `(process_id, name)`, used to key persisted series
    /// so identifier reuse under a different name never cross-contaminates
    /// history.
    pub fn identity_hash(&self) -> String {
        identity_hash(&self.process_id, &self.name)
    }
}

/// Hash of a `(process_id, name)` series identity.
pub fn identity_hash(process_id: &str, name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(process_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Result of one collection pass over the supervisor.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    /// Normalized snapshots, one per parseable process entry.
    pub snapshots: Vec<ProcessSnapshot>,
    /// Count of malformed entries skipped during normalization.
    pub skipped: usize,
}

/// Errors raised while asking a source for snapshots.
///
/// Every variant means "could not ask" — a source never reports failure as
/// an empty process list.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The supervisor could not be reached or answered with garbage.
    #[error("supervisor unavailable: {reason}")]
    Unavailable {
        /// Human-readable cause, surfaced on the status summary.
        reason: String,
    },

    /// The supervisor query exceeded its deadline.
    #[error("supervisor query timed out after {secs}s")]
    Timeout {
        /// The configured deadline.
        secs: u64,
    },

    /// The list command could not be spawned.
    #[error("failed to spawn supervisor query: {0}")]
    Spawn(#[from] std::io::Error),

    /// The top-level payload was not valid JSON.
    #[error("malformed supervisor payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Trait for obtaining process snapshots from a backing source.
///
/// Implementations query the real supervisor or fabricate demo data. The
/// single collection call is the only place a cycle may block, so
/// implementations must bound their own I/O.
pub trait ProcessDataSource: Send {
    /// Collect a snapshot of every supervised process.
    ///
    /// Malformed individual entries are skipped and counted in the returned
    /// [`Collection`]; total failure is an explicit [`SourceError`], never
    /// an empty list.
    fn collect(&mut self) -> Result<Collection, SourceError>;

    /// Returns a human-readable description of the source.
    fn description(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_pm2_spellings() {
        assert_eq!(
            "waiting restart".parse::<ProcessStatus>().unwrap(),
            ProcessStatus::WaitingRestart
        );
        assert_eq!(
            "waiting-restart".parse::<ProcessStatus>().unwrap(),
            ProcessStatus::WaitingRestart
        );
        assert_eq!(
            "ONLINE".parse::<ProcessStatus>().unwrap(),
            ProcessStatus::Online
        );
        assert!("degraded".parse::<ProcessStatus>().is_err());
    }

    #[test]
    fn status_round_trips_kebab_case() {
        let json = serde_json::to_string(&ProcessStatus::WaitingRestart).unwrap();
        assert_eq!(json, "\"waiting-restart\"");
        let back: ProcessStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ProcessStatus::WaitingRestart);
    }

    #[test]
    fn identity_hash_distinguishes_reused_ids() {
        let first = identity_hash("3", "api-server");
        let second = identity_hash("3", "worker");
        assert_ne!(first, second);
        assert_eq!(first, identity_hash("3", "api-server"));
        assert_eq!(first.len(), 64);
    }
}
