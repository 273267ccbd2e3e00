//! IPC helpers for communicating with the resident monitoring engine.
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{self, BufRead, BufReader, Write},
    os::unix::net::UnixStream,
    path::PathBuf,
};
use thiserror::Error;

use crate::{
    monitor::{CycleReport, MonitoringSession, StatusSummary},
    runtime,
    score::HealthRecord,
};

/// Directory where runtime artifacts (PID/socket/lock files) are stored.
fn runtime_dir() -> Result<PathBuf, ControlError> {
    let path = runtime::state_dir();
    fs::create_dir_all(&path)?;
    Ok(path)
}

/// Returns the unix socket path used to communicate with the resident engine.
pub fn socket_path() -> Result<PathBuf, ControlError> {
    Ok(runtime_dir()?.join("control.sock"))
}

/// Returns the path where the engine PID is recorded.
pub fn engine_pid_path() -> Result<PathBuf, ControlError> {
    Ok(runtime_dir()?.join("ppulse.pid"))
}

/// Returns the path of the single-instance lock file.
pub fn lock_path() -> Result<PathBuf, ControlError> {
    Ok(runtime_dir()?.join("engine.lock"))
}

/// Message sent from CLI invocations to the resident engine.
#[derive(Debug, Serialize, Deserialize)]
pub enum ControlCommand {
    /// Fetch the cached status summary.
    Status,
    /// Fetch the scheduler session.
    Session,
    /// Run one ad-hoc collection cycle.
    Collect,
    /// Start scheduled monitoring; `None` keeps the configured interval.
    StartMonitoring {
        /// Interval override in minutes.
        interval_minutes: Option<u64>,
    },
    /// Stop scheduled monitoring; the cached summary stays readable.
    StopMonitoring,
    /// Range-query the history store.
    History {
        /// Process name, or identifier when `by_id` is set.
        process: String,
        /// Select by supervisor-assigned identifier instead of name.
        by_id: bool,
        /// Only records from the trailing window of this many minutes.
        since_minutes: Option<i64>,
        /// Keep only the newest N records.
        limit: Option<usize>,
    },
    /// Shut the engine down.
    Shutdown,
}

/// Response sent by the engine.
#[derive(Debug, Serialize, Deserialize)]
pub enum ControlResponse {
    /// Cached status summary.
    Summary(StatusSummary),
    /// Scheduler session.
    Session(MonitoringSession),
    /// Ad-hoc cycle outcome.
    Cycle(CycleReport),
    /// History query result.
    Records(Vec<HealthRecord>),
    /// Command succeeded with nothing to return.
    Ok,
    /// Command succeeded with a human-readable note.
    Message(String),
    /// Command failed.
    Error(String),
}

/// Errors raised by the control channel helpers.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control socket I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialise control message: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("engine reported error: {0}")]
    Server(String),
    #[error("control socket not available")]
    NotAvailable,
}

/// Sends a command to the engine and waits for a response.
pub fn send_command(command: &ControlCommand) -> Result<ControlResponse, ControlError> {
    let path = socket_path()?;
    if !path.exists() {
        return Err(ControlError::NotAvailable);
    }

    let mut stream = UnixStream::connect(path)?;
    let payload = serde_json::to_vec(command)?;
    stream.write_all(&payload)?;
    stream.write_all(b"\n")?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    if response_line.trim().is_empty() {
        return Err(ControlError::NotAvailable);
    }

    let response: ControlResponse = serde_json::from_str(response_line.trim())?;
    if let ControlResponse::Error(message) = &response {
        return Err(ControlError::Server(message.clone()));
    }

    Ok(response)
}

/// Utility to read a command from a `UnixStream`. Used by the engine event loop.
pub fn read_command(stream: &mut UnixStream) -> Result<ControlCommand, ControlError> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line)?;

    if line.trim().is_empty() {
        return Err(ControlError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "empty control command",
        )));
    }

    Ok(serde_json::from_str(line.trim())?)
}

/// Writes a response to the connected CLI client.
pub fn write_response(
    stream: &mut UnixStream,
    response: &ControlResponse,
) -> Result<(), ControlError> {
    let payload = serde_json::to_vec(response)?;
    stream.write_all(&payload)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}

/// Persists the engine PID for later CLI detection.
pub fn write_engine_pid(pid: libc::pid_t) -> Result<(), ControlError> {
    let path = engine_pid_path()?;
    fs::write(path, pid.to_string())?;
    Ok(())
}

/// Reads the engine PID if present.
pub fn read_engine_pid() -> Result<Option<libc::pid_t>, ControlError> {
    let path = engine_pid_path()?;
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    contents
        .trim()
        .parse::<libc::pid_t>()
        .map(Some)
        .map_err(|e| ControlError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

/// Clears the engine PID and removes the socket file.
pub fn cleanup_runtime() -> Result<(), ControlError> {
    if let Ok(path) = socket_path()
        && path.exists()
    {
        let _ = fs::remove_file(path);
    }

    if let Ok(pid_path) = engine_pid_path()
        && pid_path.exists()
    {
        let _ = fs::remove_file(pid_path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{os::unix::net::UnixListener, thread};

    use tempfile::tempdir;

    use super::*;
    use crate::test_utils::env_lock;

    #[test]
    fn commands_round_trip_as_json() {
        let command = ControlCommand::History {
            process: "api-server".into(),
            by_id: false,
            since_minutes: Some(30),
            limit: Some(10),
        };
        let encoded = serde_json::to_string(&command).unwrap();
        let decoded: ControlCommand = serde_json::from_str(&encoded).unwrap();
        assert!(matches!(
            decoded,
            ControlCommand::History { process, by_id: false, since_minutes: Some(30), limit: Some(10) }
                if process == "api-server"
        ));
    }

    #[test]
    fn send_command_reports_missing_socket() {
        let _guard = env_lock();
        let temp = tempdir().unwrap();
        crate::runtime::init_with_test_home(temp.path());

        let err = send_command(&ControlCommand::Status).unwrap_err();
        assert!(matches!(err, ControlError::NotAvailable));
    }

    #[test]
    fn send_command_round_trips_over_the_socket() {
        let _guard = env_lock();
        let temp = tempdir().unwrap();
        crate::runtime::init_with_test_home(temp.path());

        let path = socket_path().unwrap();
        let listener = UnixListener::bind(&path).unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _addr) = listener.accept().unwrap();
            let command = read_command(&mut stream).unwrap();
            assert!(matches!(command, ControlCommand::Session));
            write_response(
                &mut stream,
                &ControlResponse::Session(MonitoringSession::default()),
            )
            .unwrap();
        });

        let response = send_command(&ControlCommand::Session).unwrap();
        assert!(matches!(response, ControlResponse::Session(_)));
        server.join().unwrap();
    }

    #[test]
    fn server_errors_surface_as_control_errors() {
        let _guard = env_lock();
        let temp = tempdir().unwrap();
        crate::runtime::init_with_test_home(temp.path());

        let path = socket_path().unwrap();
        let listener = UnixListener::bind(&path).unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _addr) = listener.accept().unwrap();
            let _ = read_command(&mut stream).unwrap();
            write_response(&mut stream, &ControlResponse::Error("boom".into())).unwrap();
        });

        let err = send_command(&ControlCommand::Status).unwrap_err();
        assert!(matches!(err, ControlError::Server(message) if message == "boom"));
        server.join().unwrap();
    }
}
