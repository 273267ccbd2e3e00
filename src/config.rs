//! Configuration management for procpulse.
use regex::Regex;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use strum_macros::{AsRefStr, EnumString};

use crate::{
    error::MonitorError,
    history::RetentionPolicy,
    runtime,
    score::ScoreThresholds,
    source::{ProcessDataSource, SupervisorBackedSource, SyntheticSource},
};

/// Represents the structure of the configuration file.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Configuration version.
    pub version: String,
    /// Where snapshots come from.
    #[serde(default)]
    pub source: SourceConfig,
    /// Scheduler interval and scoring thresholds.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// History retention bounds.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// History persistence medium.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Where supervised process logs live.
    #[serde(default)]
    pub logs: LogsConfig,
}

impl Config {
    /// Validates every section, surfacing configuration errors
    /// synchronously before the engine starts.
    pub fn validate(&self) -> Result<(), MonitorError> {
        self.source.validate()?;
        self.monitor.validate()?;
        self.retention.policy().validate()?;
        Ok(())
    }
}

/// Which snapshot source variant to run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Deserialize, EnumString, AsRefStr, Default,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Query the external supervisor's list command.
    #[default]
    Supervisor,
    /// Fabricate a plausible fleet (demo/serverless deployments).
    Synthetic,
}

/// Snapshot source configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Source variant.
    pub kind: SourceKind,
    /// List-processes invocation for the supervisor variant.
    pub command: Vec<String>,
    /// Deadline for the supervisor query.
    pub timeout_secs: u64,
    /// Fixed RNG seed for the synthetic variant; entropy when unset.
    pub seed: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Supervisor,
            command: vec!["pm2".into(), "jlist".into()],
            timeout_secs: 5,
            seed: None,
        }
    }
}

impl SourceConfig {
    fn validate(&self) -> Result<(), MonitorError> {
        if self.timeout_secs == 0 {
            return Err(MonitorError::InvalidSourceConfig {
                reason: "timeout_secs must be positive".into(),
            });
        }
        if self.kind == SourceKind::Supervisor && self.command.is_empty() {
            return Err(MonitorError::InvalidSourceConfig {
                reason: "command must not be empty for the supervisor source".into(),
            });
        }
        Ok(())
    }

    /// Builds the configured source variant. Selection happens exactly once,
    /// here; the engine only ever sees the trait object.
    pub fn build(&self) -> Box<dyn ProcessDataSource> {
        match self.kind {
            SourceKind::Supervisor => Box::new(SupervisorBackedSource::new(
                self.command.clone(),
                Duration::from_secs(self.timeout_secs),
            )),
            SourceKind::Synthetic => match self.seed {
                Some(seed) => Box::new(SyntheticSource::with_seed(seed)),
                None => Box::new(SyntheticSource::new()),
            },
        }
    }
}

/// Scheduler interval and scoring thresholds, with the documented defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Minutes between scheduled collection cycles.
    pub interval_minutes: u64,
    /// CPU percentage above which the CPU penalty starts.
    pub cpu_threshold_percent: f64,
    /// Resident memory above which the memory penalty starts.
    pub memory_threshold_bytes: u64,
    /// Restarts tolerated per trailing hour before the penalty.
    pub max_restarts_per_hour: u64,
    /// Minimum score for a healthy verdict.
    pub healthy_score_cutoff: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let thresholds = ScoreThresholds::default();
        Self {
            interval_minutes: 1,
            cpu_threshold_percent: thresholds.cpu_threshold_percent,
            memory_threshold_bytes: thresholds.memory_threshold_bytes,
            max_restarts_per_hour: thresholds.max_restarts_in_window,
            healthy_score_cutoff: thresholds.healthy_score_cutoff,
        }
    }
}

impl MonitorConfig {
    fn validate(&self) -> Result<(), MonitorError> {
        if self.interval_minutes == 0 {
            return Err(MonitorError::InvalidInterval { minutes: 0 });
        }
        if self.cpu_threshold_percent <= 0.0 {
            return Err(MonitorError::InvalidThreshold {
                field: "monitor.cpu_threshold_percent",
                value: self.cpu_threshold_percent,
            });
        }
        if self.memory_threshold_bytes == 0 {
            return Err(MonitorError::InvalidThreshold {
                field: "monitor.memory_threshold_bytes",
                value: 0.0,
            });
        }
        if !(0.0..=100.0).contains(&self.healthy_score_cutoff) {
            return Err(MonitorError::InvalidThreshold {
                field: "monitor.healthy_score_cutoff",
                value: self.healthy_score_cutoff,
            });
        }
        Ok(())
    }

    /// The scoring thresholds this configuration describes.
    pub fn thresholds(&self) -> ScoreThresholds {
        ScoreThresholds {
            cpu_threshold_percent: self.cpu_threshold_percent,
            memory_threshold_bytes: self.memory_threshold_bytes,
            max_restarts_in_window: self.max_restarts_per_hour,
            healthy_score_cutoff: self.healthy_score_cutoff,
            ..ScoreThresholds::default()
        }
    }
}

/// History retention bounds.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Records older than this many minutes are dropped.
    pub max_age_minutes: i64,
    /// Per-series record cap.
    pub max_records: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        let policy = RetentionPolicy::default();
        Self {
            max_age_minutes: policy.max_age_minutes,
            max_records: policy.max_records,
        }
    }
}

impl RetentionConfig {
    /// The retention policy this configuration describes.
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_age_minutes: self.max_age_minutes,
            max_records: self.max_records,
        }
    }
}

/// History persistence medium. Durability across engine restarts holds
/// exactly when this is enabled.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Persist series to disk and rehydrate them at startup.
    pub enabled: bool,
    /// Directory override; defaults to the runtime history directory.
    pub directory: Option<String>,
}

impl PersistenceConfig {
    /// The directory persisted series land in.
    pub fn resolve_directory(&self) -> PathBuf {
        self.directory
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(runtime::history_dir)
    }
}

/// Supervised process log locations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    /// Directory override; defaults to the runtime log directory.
    pub directory: Option<String>,
}

impl LogsConfig {
    /// The directory `<name>.log` files are read from.
    pub fn resolve_directory(&self) -> PathBuf {
        self.directory
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(runtime::log_dir)
    }
}

/// Expands environment variables within a string.
fn expand_env_vars(input: &str) -> Result<String, MonitorError> {
    let re = Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").unwrap();
    let mut missing: Option<String> = None;
    let result = re.replace_all(input, |caps: &regex::Captures| {
        match env::var(&caps[1]) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            }
        }
    });

    if let Some(name) = missing {
        return Err(MonitorError::MissingEnvVar(name));
    }
    Ok(result.into_owned())
}

fn default_config_path() -> PathBuf {
    if Path::new("procpulse.yaml").exists() {
        return PathBuf::from("procpulse.yaml");
    }
    if Path::new("ppulse.yaml").exists() {
        return PathBuf::from("ppulse.yaml");
    }
    for dir in runtime::config_dirs() {
        let candidate = dir.join("procpulse.yaml");
        if candidate.exists() {
            return candidate;
        }
    }
    PathBuf::from("procpulse.yaml")
}

/// Loads and parses the configuration file, expanding environment variables
/// and validating every section.
pub fn load_config(config_path: Option<&str>) -> Result<Config, MonitorError> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    let content = fs::read_to_string(&config_path).map_err(|e| {
        MonitorError::ConfigReadError(std::io::Error::new(
            e.kind(),
            format!("{} ({})", e, config_path.display()),
        ))
    })?;

    let expanded = expand_env_vars(&content)?;
    let config: Config =
        serde_yaml::from_str(&expanded).map_err(MonitorError::ConfigParseError)?;
    config.validate()?;
    Ok(config)
}
