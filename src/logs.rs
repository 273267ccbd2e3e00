//! Log retrieval for supervised processes.
//!
//! The engine consumes logs through the [`LogSource`] capability so no
//! component embeds a process-invocation detail directly.
use std::{
    fs,
    io::{self, BufRead, BufReader},
    path::PathBuf,
    process::Command,
};

use thiserror::Error;

/// Errors raised by log retrieval.
#[derive(Debug, Error)]
pub enum LogError {
    /// No log file exists for the named process.
    #[error("no log file for process '{0}'")]
    NotFound(String),

    /// Error reading or truncating a log file.
    #[error("log I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The supervisor's log command exited with a non-zero status.
    #[error("log command exited with status {0:?}")]
    CommandFailed(Option<i32>),
}

/// Capability for fetching and clearing a process's logs.
pub trait LogSource {
    /// Returns up to `max_lines` of the newest log lines.
    fn fetch(&self, process: &str, max_lines: usize) -> Result<Vec<String>, LogError>;

    /// Discards the process's accumulated logs. Clearing an absent log is
    /// a no-op.
    fn clear(&self, process: &str) -> Result<(), LogError>;
}

/// Reads `<directory>/<process>.log` files directly.
pub struct FileLogSource {
    directory: PathBuf,
}

impl FileLogSource {
    /// Creates a source over the given log directory.
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    fn log_path(&self, process: &str) -> PathBuf {
        self.directory.join(format!("{process}.log"))
    }
}

impl LogSource for FileLogSource {
    fn fetch(&self, process: &str, max_lines: usize) -> Result<Vec<String>, LogError> {
        let path = self.log_path(process);
        if !path.exists() {
            return Err(LogError::NotFound(process.to_string()));
        }

        let file = fs::File::open(path)?;
        let reader = BufReader::new(file);
        let all_lines: Vec<String> = reader.lines().map_while(Result::ok).collect();

        let start = all_lines.len().saturating_sub(max_lines);
        Ok(all_lines[start..].to_vec())
    }

    fn clear(&self, process: &str) -> Result<(), LogError> {
        let path = self.log_path(process);
        if path.exists() {
            fs::write(path, b"")?;
        }
        Ok(())
    }
}

/// Shells out to the supervisor's log commands (PM2's `logs`/`flush`).
pub struct SupervisorLogSource {
    program: String,
}

impl SupervisorLogSource {
    /// Creates a source that invokes the given supervisor program.
    pub fn new(program: String) -> Self {
        Self { program }
    }
}

impl LogSource for SupervisorLogSource {
    fn fetch(&self, process: &str, max_lines: usize) -> Result<Vec<String>, LogError> {
        let output = Command::new(&self.program)
            .arg("logs")
            .arg(process)
            .arg("--nostream")
            .arg("--lines")
            .arg(max_lines.to_string())
            .output()?;

        if !output.status.success() {
            return Err(LogError::CommandFailed(output.status.code()));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text.lines().map(|line| line.to_string()).collect())
    }

    fn clear(&self, process: &str) -> Result<(), LogError> {
        let status = Command::new(&self.program)
            .arg("flush")
            .arg(process)
            .status()?;

        if !status.success() {
            return Err(LogError::CommandFailed(status.code()));
        }
        Ok(())
    }
}
