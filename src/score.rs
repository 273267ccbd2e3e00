//! Health scoring for process snapshots.
//!
//! [`score`] is a pure function of its arguments. It performs no I/O and
//! touches no shared state, so per-process scoring is safe to run
//! concurrently.
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;

use crate::source::{ProcessSnapshot, ProcessStatus};

/// Named problem classes attached to a [`HealthRecord`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, PartialOrd, Ord,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum IssueTag {
    /// Process is not in the `online` state.
    NotOnline,
    /// CPU usage above the configured threshold.
    HighCpu,
    /// Resident memory above the configured threshold.
    HighMemory,
    /// More restarts inside the trailing window than the configured budget.
    HighRestartRate,
}

impl IssueTag {
    /// A critical tag disqualifies a process from being healthy regardless
    /// of score. Metric tags are informational: a process can carry them
    /// and still be healthy when its score stays above the cutoff.
    pub fn is_critical(&self) -> bool {
        matches!(self, IssueTag::NotOnline)
    }
}

impl fmt::Display for IssueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

/// The scorer's output for one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Supervisor-assigned identifier, copied from the snapshot.
    pub process_id: String,
    /// Process name, copied from the snapshot.
    pub name: String,
    /// Collection timestamp, copied from the snapshot.
    pub collected_at: DateTime<Utc>,
    /// Composite fitness, 0-100.
    pub health_score: f64,
    /// Derived verdict; see [`ScoreThresholds::healthy_score_cutoff`].
    pub is_healthy: bool,
    /// Issue tags, in rule order, no duplicates.
    pub issues: Vec<IssueTag>,
    /// Restart counter at collection time. Carried so restart-rate context
    /// can be derived from the series alone.
    pub restart_count: u64,
}

/// Scoring thresholds with the documented defaults. All of these are
/// deployment configuration, not per-process tuning.
#[derive(Debug, Clone)]
pub struct ScoreThresholds {
    /// CPU percentage above which the CPU penalty starts. Default 80.
    pub cpu_threshold_percent: f64,
    /// Penalty per percentage point above the CPU threshold. Default 1.5.
    pub cpu_penalty_per_point: f64,
    /// Upper bound on the CPU penalty. Default 30.
    pub cpu_penalty_cap: f64,
    /// Resident memory above which the memory penalty starts. Default 512 MiB.
    pub memory_threshold_bytes: u64,
    /// Upper bound on the memory penalty. Default 20.
    pub memory_penalty_cap: f64,
    /// Width of the restart-rate window, in minutes. Default 60.
    pub restart_window_minutes: i64,
    /// Restarts tolerated inside the window before the penalty. Default 3.
    pub max_restarts_in_window: u64,
    /// Penalty for exceeding the restart budget. Default 15.
    pub restart_penalty: f64,
    /// Score cap for processes that are not online. Default 50.
    pub offline_score_cap: f64,
    /// Minimum score for a healthy verdict. Default 70.
    pub healthy_score_cutoff: f64,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            cpu_threshold_percent: 80.0,
            cpu_penalty_per_point: 1.5,
            cpu_penalty_cap: 30.0,
            memory_threshold_bytes: 512 * 1024 * 1024,
            memory_penalty_cap: 20.0,
            restart_window_minutes: 60,
            max_restarts_in_window: 3,
            restart_penalty: 15.0,
            offline_score_cap: 50.0,
            healthy_score_cutoff: 70.0,
        }
    }
}

impl ScoreThresholds {
    /// The restart-rate window as a [`Duration`].
    pub fn restart_window(&self) -> Duration {
        Duration::minutes(self.restart_window_minutes)
    }
}

/// Scores one snapshot against its recent history.
///
/// Deterministic: identical inputs always produce identical records.
pub fn score(
    snapshot: &ProcessSnapshot,
    recent: &[HealthRecord],
    thresholds: &ScoreThresholds,
) -> HealthRecord {
    let mut health_score = 100.0f64;
    let mut issues = Vec::new();

    if snapshot.status != ProcessStatus::Online {
        health_score = health_score.min(thresholds.offline_score_cap);
        issues.push(IssueTag::NotOnline);
    }

    if snapshot.cpu_percent > thresholds.cpu_threshold_percent {
        let over = snapshot.cpu_percent - thresholds.cpu_threshold_percent;
        let penalty = (over * thresholds.cpu_penalty_per_point)
            .min(thresholds.cpu_penalty_cap);
        health_score -= penalty;
        issues.push(IssueTag::HighCpu);
    }

    if snapshot.memory_bytes > thresholds.memory_threshold_bytes {
        let overage_ratio = (snapshot.memory_bytes - thresholds.memory_threshold_bytes)
            as f64
            / thresholds.memory_threshold_bytes as f64;
        let penalty = (thresholds.memory_penalty_cap * overage_ratio)
            .min(thresholds.memory_penalty_cap);
        health_score -= penalty;
        issues.push(IssueTag::HighMemory);
    }

    if restarts_in_window(snapshot, recent, thresholds.restart_window())
        > thresholds.max_restarts_in_window
    {
        health_score -= thresholds.restart_penalty;
        issues.push(IssueTag::HighRestartRate);
    }

    let health_score = health_score.clamp(0.0, 100.0);
    let is_healthy = health_score >= thresholds.healthy_score_cutoff
        && !issues.iter().any(IssueTag::is_critical);

    HealthRecord {
        process_id: snapshot.process_id.clone(),
        name: snapshot.name.clone(),
        collected_at: snapshot.collected_at,
        health_score,
        is_healthy,
        issues,
        restart_count: snapshot.restart_count,
    }
}

/// Restarts observed inside the trailing window, derived as the delta
/// between the snapshot's counter and the oldest in-window record's
/// counter. No in-window history means no observable restarts.
fn restarts_in_window(
    snapshot: &ProcessSnapshot,
    recent: &[HealthRecord],
    window: Duration,
) -> u64 {
    let cutoff = snapshot.collected_at - window;
    let baseline = recent
        .iter()
        .filter(|record| {
            record.collected_at >= cutoff && record.collected_at <= snapshot.collected_at
        })
        .map(|record| record.restart_count)
        .min();

    match baseline {
        Some(count) => snapshot.restart_count.saturating_sub(count),
        None => 0,
    }
}
