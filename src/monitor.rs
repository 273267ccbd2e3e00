//! Monitor scheduler: the recurring collect → score → store → publish cycle.
use std::{
    cmp,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration as StdDuration,
};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;
use tracing::{debug, info, warn};

use crate::{
    error::MonitorError,
    history::{AppendOutcome, HistoryStore, ProcessSelector},
    score::{self, HealthRecord, ScoreThresholds},
    source::{ProcessDataSource, SourceError},
    system::{self, SystemSnapshot},
};

/// Scheduler lifecycle state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Default,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    /// No scheduled cycles.
    #[default]
    Stopped,
    /// A ticker thread is driving cycles.
    Running,
}

/// Process-wide lifecycle state for the scheduler. Exactly one session
/// exists per engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSession {
    /// Whether the scheduler is running.
    pub state: SessionState,
    /// Configured interval between scheduled cycles.
    pub interval_minutes: u64,
    /// Timestamp of the last completed cycle, scheduled or ad-hoc.
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl Default for MonitoringSession {
    fn default() -> Self {
        Self {
            state: SessionState::Stopped,
            interval_minutes: 1,
            last_cycle_at: None,
        }
    }
}

/// Supervisor failure metadata carried on the summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnavailableNotice {
    /// When the failed collection was attempted.
    pub at: DateTime<Utc>,
    /// What the source reported.
    pub reason: String,
}

/// The cached read model: the latest completed cycle, whole.
///
/// Published with a single overwrite, so readers see either the previous
/// cycle or this one, never a mix. The default value is the legitimate
/// "no cycle has completed yet" summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusSummary {
    /// Timestamp of the cycle this summary reflects; `None` before the
    /// first completed cycle.
    pub generated_at: Option<DateTime<Utc>>,
    /// Most recent record per known process.
    pub processes: Vec<HealthRecord>,
    /// Process count.
    pub total: usize,
    /// Healthy process count.
    pub healthy: usize,
    /// Processes carrying at least one issue tag.
    pub with_issues: usize,
    /// Mean health score, 0 when there are no processes.
    pub average_score: f64,
    /// Whether the last collection attempt reached the supervisor.
    pub supervisor_available: bool,
    /// Metadata for the most recent failed attempt, if any since the last
    /// successful cycle.
    pub last_failure: Option<UnavailableNotice>,
    /// Host metrics sampled at publish time.
    pub system: Option<SystemSnapshot>,
}

impl StatusSummary {
    fn from_cycle(
        records: Vec<HealthRecord>,
        generated_at: DateTime<Utc>,
        system: SystemSnapshot,
    ) -> Self {
        let total = records.len();
        let healthy = records.iter().filter(|r| r.is_healthy).count();
        let with_issues = records.iter().filter(|r| !r.issues.is_empty()).count();
        let average_score = if total == 0 {
            0.0
        } else {
            records.iter().map(|r| r.health_score).sum::<f64>() / total as f64
        };

        Self {
            generated_at: Some(generated_at),
            processes: records,
            total,
            healthy,
            with_issues,
            average_score,
            supervisor_available: true,
            last_failure: None,
            system: Some(system),
        }
    }
}

/// Outcome of one completed collection cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    /// The cycle's monotonic timestamp.
    pub completed_at: DateTime<Utc>,
    /// Every record scored this cycle.
    pub records: Vec<HealthRecord>,
    /// Malformed supervisor entries skipped by the collector.
    pub skipped_entries: usize,
    /// Appends rejected by the store (out-of-order timestamps).
    pub rejected_writes: usize,
    /// Appends that reached memory but not the persistence medium.
    pub memory_only_writes: usize,
}

impl CycleReport {
    /// Healthy process count for this cycle.
    pub fn healthy_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_healthy).count()
    }

    /// Mean health score for this cycle, 0 when empty.
    pub fn average_score(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        self.records.iter().map(|r| r.health_score).sum::<f64>()
            / self.records.len() as f64
    }
}

/// Hands out strictly-increasing cycle timestamps. Holding this lock for
/// the duration of a cycle is what serializes scheduled and ad-hoc
/// collection.
#[derive(Debug, Default)]
struct CycleClock {
    last_stamp: Option<DateTime<Utc>>,
}

impl CycleClock {
    fn next_stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(prev) => cmp::max(now, prev + Duration::milliseconds(1)),
            None => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

struct Shared {
    source: Mutex<Box<dyn ProcessDataSource>>,
    store: RwLock<HistoryStore>,
    summary: RwLock<StatusSummary>,
    session: Mutex<MonitoringSession>,
    cycle: Mutex<CycleClock>,
    thresholds: ScoreThresholds,
}

struct Ticker {
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

/// The monitoring engine: owns the session, the history store, and the
/// summary cache; drives cycles on a schedule or on demand.
pub struct Monitor {
    shared: Arc<Shared>,
    ticker: Mutex<Option<Ticker>>,
}

impl Monitor {
    /// Creates a stopped monitor around the injected source and store.
    pub fn new(
        source: Box<dyn ProcessDataSource>,
        store: HistoryStore,
        thresholds: ScoreThresholds,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                source: Mutex::new(source),
                store: RwLock::new(store),
                summary: RwLock::new(StatusSummary::default()),
                session: Mutex::new(MonitoringSession::default()),
                cycle: Mutex::new(CycleClock::default()),
                thresholds,
            }),
            ticker: Mutex::new(None),
        }
    }

    /// Starts scheduled collection.
    ///
    /// Idempotent: when already running this returns the existing session
    /// without spawning a second ticker or resetting `last_cycle_at`. A
    /// fresh start performs its first cycle immediately.
    pub fn start(&self, interval_minutes: u64) -> Result<MonitoringSession, MonitorError> {
        if interval_minutes == 0 {
            return Err(MonitorError::InvalidInterval { minutes: 0 });
        }

        let mut ticker_guard = self.ticker.lock()?;
        let mut session = self.shared.session.lock()?;
        if session.state == SessionState::Running {
            info!(
                "Monitoring already running at {}m interval; ignoring start",
                session.interval_minutes
            );
            return Ok(session.clone());
        }

        session.state = SessionState::Running;
        session.interval_minutes = interval_minutes;
        let started = session.clone();
        drop(session);

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let shared = Arc::clone(&self.shared);

        let handle = thread::spawn(move || {
            let interval = StdDuration::from_secs(interval_minutes * 60);
            while !stop_flag.load(Ordering::SeqCst) {
                match run_cycle(&shared) {
                    Ok(report) => debug!(
                        "Cycle completed: {} processes, {} skipped",
                        report.records.len(),
                        report.skipped_entries
                    ),
                    Err(err) => warn!("Collection cycle skipped: {err}"),
                }

                let mut slept = StdDuration::ZERO;
                while slept < interval {
                    if stop_flag.load(Ordering::SeqCst) {
                        return;
                    }
                    let remaining = interval.saturating_sub(slept);
                    let step = cmp::min(remaining, StdDuration::from_millis(100));
                    thread::sleep(step);
                    slept += step;
                }
            }
        });

        *ticker_guard = Some(Ticker { stop, handle });
        info!("Monitoring started at {interval_minutes}m interval");
        Ok(started)
    }

    /// Stops scheduled collection. Cancels the pending tick immediately;
    /// an in-flight cycle finishes and publishes before the session reads
    /// `Stopped`.
    pub fn stop(&self) -> Result<MonitoringSession, MonitorError> {
        let mut ticker_guard = self.ticker.lock()?;
        if let Some(ticker) = ticker_guard.take() {
            ticker.stop.store(true, Ordering::SeqCst);
            let _ = ticker.handle.join();
        }

        let mut session = self.shared.session.lock()?;
        session.state = SessionState::Stopped;
        info!("Monitoring stopped");
        Ok(session.clone())
    }

    /// Current session state, interval, and last-cycle timestamp.
    pub fn session(&self) -> Result<MonitoringSession, MonitorError> {
        Ok(self.shared.session.lock()?.clone())
    }

    /// The cached summary. The empty summary before the first completed
    /// cycle; never an error.
    pub fn current_status(&self) -> Result<StatusSummary, MonitorError> {
        Ok(self.shared.summary.read()?.clone())
    }

    /// Runs one ad-hoc cycle through the same pipeline and the same cycle
    /// lock as scheduled ticks. Works while the scheduler is stopped.
    pub fn collect_now(&self) -> Result<CycleReport, MonitorError> {
        run_cycle(&self.shared)
    }

    /// Range query against the history store.
    pub fn query_history(
        &self,
        selector: &ProcessSelector,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<HealthRecord>, MonitorError> {
        let store = self.shared.store.read()?;
        Ok(store.query(selector, since).cloned().collect())
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.ticker.lock()
            && let Some(ticker) = guard.take()
        {
            ticker.stop.store(true, Ordering::SeqCst);
            let _ = ticker.handle.join();
        }
    }
}

/// One complete cycle: collect, score, append, publish.
fn run_cycle(shared: &Arc<Shared>) -> Result<CycleReport, MonitorError> {
    // Serializes cycles; a second trigger waits here rather than
    // interleaving store writes with the one in flight.
    let mut clock = shared.cycle.lock()?;

    let collected = {
        let mut source = shared.source.lock()?;
        source.collect()
    };

    let mut collection = match collected {
        Ok(collection) => collection,
        Err(err) => {
            warn!("Snapshot source unavailable: {err}");
            record_unavailability(shared, &err)?;
            return Err(err.into());
        }
    };

    let stamp = clock.next_stamp();
    for snapshot in &mut collection.snapshots {
        snapshot.collected_at = stamp;
    }

    let window_start = stamp - shared.thresholds.restart_window();
    let mut records = Vec::with_capacity(collection.snapshots.len());
    let mut rejected_writes = 0usize;
    let mut memory_only_writes = 0usize;

    {
        let mut store = shared.store.write()?;
        for snapshot in &collection.snapshots {
            let window =
                store.series_window(&snapshot.process_id, &snapshot.name, window_start);
            let record = score::score(snapshot, &window, &shared.thresholds);

            match store.append(&record) {
                Ok(AppendOutcome::Persisted) => {}
                Ok(AppendOutcome::MemoryOnly) => memory_only_writes += 1,
                Err(err) => {
                    rejected_writes += 1;
                    warn!("History append rejected: {err}");
                }
            }

            records.push(record);
        }
        store.prune(stamp);
    }

    let summary = StatusSummary::from_cycle(records.clone(), stamp, system::snapshot());
    *shared.summary.write()? = summary;

    let mut session = shared.session.lock()?;
    session.last_cycle_at = Some(stamp);
    drop(session);

    Ok(CycleReport {
        completed_at: stamp,
        records,
        skipped_entries: collection.skipped,
        rejected_writes,
        memory_only_writes,
    })
}

/// A failed tick leaves the previous cycle's processes visible and only
/// flips the availability metadata.
fn record_unavailability(
    shared: &Arc<Shared>,
    err: &SourceError,
) -> Result<(), MonitorError> {
    let mut summary = shared.summary.write()?;
    summary.supervisor_available = false;
    summary.last_failure = Some(UnavailableNotice {
        at: Utc::now(),
        reason: err.to_string(),
    });
    Ok(())
}

/// Scripted source for exercising the scheduler without a supervisor.
#[cfg(test)]
pub(crate) struct ScriptedSource {
    responses: Mutex<std::collections::VecDeque<Result<crate::source::Collection, SourceError>>>,
}

#[cfg(test)]
impl ScriptedSource {
    pub(crate) fn new(
        responses: Vec<Result<crate::source::Collection, SourceError>>,
    ) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[cfg(test)]
impl ProcessDataSource for ScriptedSource {
    fn collect(&mut self) -> Result<crate::source::Collection, SourceError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(crate::source::Collection::default()))
    }

    fn description(&self) -> &str {
        "scripted"
    }
}
