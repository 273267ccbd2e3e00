//! Error handling for procpulse.
use thiserror::Error;

use crate::{history::StoreError, ipc::ControlError, source::SourceError};

/// Defines all possible errors that can occur in the monitoring engine.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Error reading or accessing a configuration file.
    #[error("Failed to read config file: {0}")]
    ConfigReadError(#[from] std::io::Error),

    /// Error parsing YAML configuration.
    #[error("Invalid YAML format: {0}")]
    ConfigParseError(#[from] serde_yaml::Error),

    /// A `${VAR}` reference in the configuration has no value in the environment.
    #[error("Config references missing environment variable: {0}")]
    MissingEnvVar(String),

    /// The configured collection interval is unusable.
    #[error("Invalid monitoring interval: {minutes} minutes")]
    InvalidInterval {
        /// The rejected interval value.
        minutes: u64,
    },

    /// The configured retention policy cannot bound the store.
    #[error("Invalid retention policy: {reason}")]
    InvalidRetention {
        /// Why the policy was rejected.
        reason: String,
    },

    /// The snapshot source configuration is unusable.
    #[error("Invalid source configuration: {reason}")]
    InvalidSourceConfig {
        /// Why the source configuration was rejected.
        reason: String,
    },

    /// A scoring threshold is outside its usable range.
    #[error("Invalid threshold '{field}': {value}")]
    InvalidThreshold {
        /// The configuration field that failed validation.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// The snapshot source could not be asked for processes.
    #[error("Snapshot source error: {0}")]
    Source(#[from] SourceError),

    /// The history store rejected an operation.
    #[error("History store error: {0}")]
    Store(#[from] StoreError),

    /// Error on the engine control channel.
    #[error("Control channel error: {0}")]
    Control(#[from] ControlError),

    /// Another engine instance already holds the runtime lock.
    #[error("Engine already running (runtime lock held): {0}")]
    EngineLocked(std::io::Error),

    /// Error for poisoned mutex.
    #[error("Mutex is poisoned: {0}")]
    MutexPoisonError(String),
}

/// Implement the `From` trait to convert a `std::sync::PoisonError` into a `MonitorError`.
impl<T> From<std::sync::PoisonError<T>> for MonitorError {
    /// Converts a `std::sync::PoisonError` into a `MonitorError`.
    fn from(err: std::sync::PoisonError<T>) -> Self {
        MonitorError::MutexPoisonError(err.to_string())
    }
}
