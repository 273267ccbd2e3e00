//! Append-only health history, keyed by process identity.
//!
//! Series are keyed by `(process_id, name)` rather than identifier alone:
//! supervisors reuse identifiers after a process is removed, and a reused
//! id must never inherit another process's history.
use std::{
    collections::{HashMap, VecDeque},
    fs,
    io::Write,
    path::PathBuf,
};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    error::MonitorError,
    score::HealthRecord,
    source::identity_hash,
};

/// Bounds how much history is kept before pruning.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Records older than this many minutes are dropped. Default 720 (12h).
    pub max_age_minutes: i64,
    /// Per-series record cap. Default 2880.
    pub max_records: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age_minutes: 720,
            max_records: 2880,
        }
    }
}

impl RetentionPolicy {
    /// Rejects policies that cannot bound the store.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.max_age_minutes <= 0 {
            return Err(MonitorError::InvalidRetention {
                reason: format!("max_age_minutes must be positive, got {}", self.max_age_minutes),
            });
        }
        if self.max_records == 0 {
            return Err(MonitorError::InvalidRetention {
                reason: "max_records must be positive".into(),
            });
        }
        Ok(())
    }

    fn age_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::minutes(self.max_age_minutes)
    }
}

/// Errors raised by the history store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Append with a non-increasing timestamp; the series is left intact.
    #[error(
        "out-of-order write for '{process}': {attempted} is not after {last}"
    )]
    OutOfOrderWrite {
        /// Process name of the rejected record.
        process: String,
        /// Timestamp of the series' newest entry.
        last: DateTime<Utc>,
        /// Timestamp of the rejected record.
        attempted: DateTime<Utc>,
    },

    /// Failed to create the persistence directory.
    #[error("failed to create history directory: {0}")]
    CreateDir(std::io::Error),

    /// Failed to write a persisted series file.
    #[error("failed to write history file: {0}")]
    PersistWrite(std::io::Error),

    /// Failed to serialise a record for persistence.
    #[error("failed to serialise history record: {0}")]
    PersistSerialize(serde_json::Error),
}

/// Whether an append reached the persistence medium.
///
/// `MemoryOnly` means the record is queryable but historical continuity on
/// disk is broken; callers report it distinctly from a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// In memory and on disk (or persistence is disabled).
    Persisted,
    /// In memory only; the medium rejected the write.
    MemoryOnly,
}

/// Selects series for a range query.
#[derive(Debug, Clone)]
pub enum ProcessSelector {
    /// Match every series with this supervisor-assigned identifier.
    Id(String),
    /// Match every series with this process name.
    Name(String),
}

impl ProcessSelector {
    fn matches(&self, key: &SeriesKey) -> bool {
        match self {
            ProcessSelector::Id(id) => key.process_id == *id,
            ProcessSelector::Name(name) => key.name == *name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct SeriesKey {
    process_id: String,
    name: String,
}

#[derive(Debug, Default)]
struct Series {
    records: VecDeque<HealthRecord>,
}

/// In-memory history with optional JSONL persistence, one file per series.
#[derive(Debug)]
pub struct HistoryStore {
    series: HashMap<SeriesKey, Series>,
    policy: RetentionPolicy,
    persistence: Option<SeriesPersistence>,
}

impl HistoryStore {
    /// Creates a memory-only store. History is lost when the engine exits.
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            series: HashMap::new(),
            policy,
            persistence: None,
        }
    }

    /// Creates a store persisted under `directory`, rehydrating whatever
    /// series files are already there. Unreadable files or lines are
    /// skipped with a warning; the engine must come up regardless.
    pub fn with_persistence(
        policy: RetentionPolicy,
        directory: PathBuf,
    ) -> Result<Self, StoreError> {
        let persistence = SeriesPersistence::new(directory)?;
        let mut store = Self {
            series: HashMap::new(),
            policy,
            persistence: None,
        };

        for record in persistence.load_all() {
            let key = SeriesKey {
                process_id: record.process_id.clone(),
                name: record.name.clone(),
            };
            let series = store.series.entry(key).or_default();
            // Persisted files are append-ordered; drop any line that would
            // violate monotonicity rather than refusing to start.
            let in_order = series
                .records
                .back()
                .is_none_or(|last| record.collected_at > last.collected_at);
            if in_order {
                series.records.push_back(record);
            }
        }

        store.persistence = Some(persistence);
        store.prune(Utc::now());
        Ok(store)
    }

    /// Appends a record to its series.
    ///
    /// Rejects a `collected_at` that is not strictly greater than the
    /// series' last entry; existing entries are never touched by a
    /// rejected append.
    pub fn append(&mut self, record: &HealthRecord) -> Result<AppendOutcome, StoreError> {
        let key = SeriesKey {
            process_id: record.process_id.clone(),
            name: record.name.clone(),
        };
        let series = self.series.entry(key.clone()).or_default();

        if let Some(last) = series.records.back()
            && record.collected_at <= last.collected_at
        {
            return Err(StoreError::OutOfOrderWrite {
                process: record.name.clone(),
                last: last.collected_at,
                attempted: record.collected_at,
            });
        }

        series.records.push_back(record.clone());

        // Inline retention relative to the newest record keeps every series
        // bounded even when the caller never prunes explicitly.
        let cutoff = self.policy.age_cutoff(record.collected_at);
        while let Some(front) = series.records.front() {
            if front.collected_at >= cutoff && series.records.len() <= self.policy.max_records
            {
                break;
            }
            series.records.pop_front();
        }

        match &self.persistence {
            Some(persistence) => match persistence.append(&key, record) {
                Ok(()) => Ok(AppendOutcome::Persisted),
                Err(err) => {
                    warn!(
                        "History write for '{}' kept in memory only: {err}",
                        record.name
                    );
                    Ok(AppendOutcome::MemoryOnly)
                }
            },
            None => Ok(AppendOutcome::Persisted),
        }
    }

    /// Drops entries outside the retention policy. Idempotent. Returns the
    /// number of records dropped.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = self.policy.age_cutoff(now);
        let mut dropped = 0usize;

        for (key, series) in self.series.iter_mut() {
            let before = series.records.len();
            while let Some(front) = series.records.front() {
                if front.collected_at >= cutoff
                    && series.records.len() <= self.policy.max_records
                {
                    break;
                }
                series.records.pop_front();
            }
            let removed = before - series.records.len();
            dropped += removed;

            if removed > 0
                && let Some(persistence) = &self.persistence
                && let Err(err) = persistence.rewrite(key, series.records.iter())
            {
                warn!("Failed to rewrite pruned history for '{}': {err}", key.name);
            }
        }

        self.series.retain(|_, series| !series.records.is_empty());
        dropped
    }

    /// Range query: all records for the selected process(es) since the
    /// given instant, ascending per series. Lazy and restartable; empty if
    /// nothing matches.
    pub fn query<'a>(
        &'a self,
        selector: &'a ProcessSelector,
        since: Option<DateTime<Utc>>,
    ) -> impl Iterator<Item = &'a HealthRecord> + 'a {
        let mut keys: Vec<&SeriesKey> = self
            .series
            .keys()
            .filter(|key| selector.matches(key))
            .collect();
        keys.sort();

        keys.into_iter()
            .flat_map(move |key| self.series[key].records.iter())
            .filter(move |record| {
                since.is_none_or(|instant| record.collected_at >= instant)
            })
    }

    /// Records for one exact `(process_id, name)` series since `since`.
    /// This is the scorer's restart-rate window.
    pub fn series_window(
        &self,
        process_id: &str,
        name: &str,
        since: DateTime<Utc>,
    ) -> Vec<HealthRecord> {
        let key = SeriesKey {
            process_id: process_id.to_string(),
            name: name.to_string(),
        };
        self.series
            .get(&key)
            .map(|series| {
                series
                    .records
                    .iter()
                    .filter(|record| record.collected_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of distinct series.
    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Total records across all series.
    pub fn record_count(&self) -> usize {
        self.series.values().map(|series| series.records.len()).sum()
    }
}

/// One JSONL file per series, named by the identity hash so reused
/// identifiers land in distinct files.
#[derive(Debug)]
struct SeriesPersistence {
    directory: PathBuf,
}

impl SeriesPersistence {
    fn new(directory: PathBuf) -> Result<Self, StoreError> {
        if !directory.exists() {
            fs::create_dir_all(&directory).map_err(StoreError::CreateDir)?;
        }
        Ok(Self { directory })
    }

    fn file_path(&self, key: &SeriesKey) -> PathBuf {
        let hash = identity_hash(&key.process_id, &key.name);
        self.directory.join(format!("{hash}.jsonl"))
    }

    fn append(&self, key: &SeriesKey, record: &HealthRecord) -> Result<(), StoreError> {
        let line = serde_json::to_vec(record).map_err(StoreError::PersistSerialize)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_path(key))
            .map_err(StoreError::PersistWrite)?;
        file.write_all(&line).map_err(StoreError::PersistWrite)?;
        file.write_all(b"\n").map_err(StoreError::PersistWrite)?;
        Ok(())
    }

    fn rewrite<'a>(
        &self,
        key: &SeriesKey,
        records: impl Iterator<Item = &'a HealthRecord>,
    ) -> Result<(), StoreError> {
        let mut buffer = Vec::new();
        for record in records {
            let line = serde_json::to_vec(record).map_err(StoreError::PersistSerialize)?;
            buffer.extend_from_slice(&line);
            buffer.push(b'\n');
        }
        fs::write(self.file_path(key), buffer).map_err(StoreError::PersistWrite)
    }

    fn load_all(&self) -> Vec<HealthRecord> {
        let mut records = Vec::new();
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Failed to read history directory: {err}");
                return records;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
                continue;
            }
            let contents = match fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(err) => {
                    warn!("Skipping unreadable history file {:?}: {err}", path);
                    continue;
                }
            };
            for line in contents.lines() {
                match serde_json::from_str::<HealthRecord>(line) {
                    Ok(record) => records.push(record),
                    Err(err) => debug!("Skipping bad history line in {:?}: {err}", path),
                }
            }
        }

        records
    }
}
