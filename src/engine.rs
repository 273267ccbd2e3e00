//! Resident engine that owns the monitor and serves the control socket.
use std::{fs, io, os::unix::net::UnixListener};

use chrono::{Duration, Utc};
use fs2::FileExt;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    error::MonitorError,
    history::{HistoryStore, ProcessSelector},
    ipc::{self, ControlCommand, ControlResponse},
    monitor::Monitor,
};

/// Long-lived engine process reacting to CLI commands over the socket.
pub struct Engine {
    monitor: Monitor,
    interval_minutes: u64,
    // Held for the engine's lifetime; releasing it lets the next instance in.
    _lock: fs::File,
}

impl Engine {
    /// Builds an engine from validated configuration, acquiring the
    /// single-instance lock and rehydrating persisted history.
    pub fn from_config(config: &Config) -> Result<Self, MonitorError> {
        config.validate()?;
        let lock = acquire_instance_lock()?;

        let store = if config.persistence.enabled {
            HistoryStore::with_persistence(
                config.retention.policy(),
                config.persistence.resolve_directory(),
            )?
        } else {
            HistoryStore::new(config.retention.policy())
        };

        let source = config.source.build();
        info!("Using snapshot source: {}", source.description());

        Ok(Self {
            monitor: Monitor::new(source, store, config.monitor.thresholds()),
            interval_minutes: config.monitor.interval_minutes,
            _lock: lock,
        })
    }

    /// Runs the engine event loop: starts scheduled monitoring and serves
    /// control commands until `Shutdown` arrives.
    pub fn run(&self) -> Result<(), MonitorError> {
        ipc::cleanup_runtime()?;
        let socket_path = ipc::socket_path()?;
        if socket_path.exists() {
            fs::remove_file(&socket_path).map_err(|err| {
                MonitorError::Control(ipc::ControlError::Io(err))
            })?;
        }

        let listener = UnixListener::bind(&socket_path)
            .map_err(|err| MonitorError::Control(ipc::ControlError::Io(err)))?;
        ipc::write_engine_pid(unsafe { libc::getpid() })?;

        self.monitor.start(self.interval_minutes)?;
        info!("procpulse engine listening on {:?}", socket_path);

        let mut shutdown_requested = false;
        while !shutdown_requested {
            match listener.accept() {
                Ok((mut stream, _addr)) => match ipc::read_command(&mut stream) {
                    Ok(command) => {
                        let should_shutdown =
                            matches!(command, ControlCommand::Shutdown);
                        debug!("Engine received command: {:?}", command);
                        match self.handle_command(command) {
                            Ok(response) => {
                                let _ = ipc::write_response(&mut stream, &response);
                                if should_shutdown {
                                    shutdown_requested = true;
                                }
                            }
                            Err(err) => {
                                error!("Engine command failed: {err}");
                                let _ = ipc::write_response(
                                    &mut stream,
                                    &ControlResponse::Error(err.to_string()),
                                );
                            }
                        }
                    }
                    Err(err) => {
                        warn!("Invalid engine command: {err}");
                        let _ = ipc::write_response(
                            &mut stream,
                            &ControlResponse::Error(err.to_string()),
                        );
                    }
                },
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    error!("Engine listener error: {err}");
                    shutdown_requested = true;
                }
            }
        }

        self.shutdown_runtime()
    }

    fn handle_command(
        &self,
        command: ControlCommand,
    ) -> Result<ControlResponse, MonitorError> {
        match command {
            ControlCommand::Status => {
                Ok(ControlResponse::Summary(self.monitor.current_status()?))
            }
            ControlCommand::Session => {
                Ok(ControlResponse::Session(self.monitor.session()?))
            }
            ControlCommand::Collect => {
                Ok(ControlResponse::Cycle(self.monitor.collect_now()?))
            }
            ControlCommand::StartMonitoring { interval_minutes } => {
                let interval = interval_minutes.unwrap_or(self.interval_minutes);
                Ok(ControlResponse::Session(self.monitor.start(interval)?))
            }
            ControlCommand::StopMonitoring => {
                Ok(ControlResponse::Session(self.monitor.stop()?))
            }
            ControlCommand::History {
                process,
                by_id,
                since_minutes,
                limit,
            } => {
                let selector = if by_id {
                    ProcessSelector::Id(process)
                } else {
                    ProcessSelector::Name(process)
                };
                let since =
                    since_minutes.map(|minutes| Utc::now() - Duration::minutes(minutes));
                let mut records = self.monitor.query_history(&selector, since)?;
                if let Some(limit) = limit
                    && records.len() > limit
                {
                    records.drain(..records.len() - limit);
                }
                Ok(ControlResponse::Records(records))
            }
            ControlCommand::Shutdown => {
                Ok(ControlResponse::Message("Engine shutting down".into()))
            }
        }
    }

    fn shutdown_runtime(&self) -> Result<(), MonitorError> {
        self.monitor.stop()?;
        ipc::cleanup_runtime()?;
        Ok(())
    }
}

/// Takes the exclusive runtime lock; a second engine instance fails fast
/// instead of double-writing history.
fn acquire_instance_lock() -> Result<fs::File, MonitorError> {
    let path = ipc::lock_path()?;
    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(&path)
        .map_err(|err| MonitorError::Control(ipc::ControlError::Io(err)))?;
    file.try_lock_exclusive()
        .map_err(MonitorError::EngineLocked)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::{config::SourceKind, test_utils::env_lock};

    fn synthetic_config() -> Config {
        let mut config: Config = serde_yaml::from_str("version: \"1\"").unwrap();
        config.source.kind = SourceKind::Synthetic;
        config.source.seed = Some(7);
        config
    }

    #[test]
    fn second_engine_instance_is_rejected() {
        let _guard = env_lock();
        let temp = tempdir().unwrap();
        crate::runtime::init_with_test_home(temp.path());

        let first = Engine::from_config(&synthetic_config()).unwrap();
        let second = Engine::from_config(&synthetic_config());
        assert!(matches!(second, Err(MonitorError::EngineLocked(_))));
        drop(first);
    }

    #[test]
    fn invalid_config_is_rejected_before_locking() {
        let _guard = env_lock();
        let temp = tempdir().unwrap();
        crate::runtime::init_with_test_home(temp.path());

        let mut config = synthetic_config();
        config.monitor.interval_minutes = 0;
        assert!(matches!(
            Engine::from_config(&config),
            Err(MonitorError::InvalidInterval { minutes: 0 })
        ));
    }

    #[test]
    fn history_command_applies_selector_and_limit() {
        let _guard = env_lock();
        let temp = tempdir().unwrap();
        crate::runtime::init_with_test_home(temp.path());

        let engine = Engine::from_config(&synthetic_config()).unwrap();
        for _ in 0..3 {
            engine.monitor.collect_now().unwrap();
        }

        let response = engine
            .handle_command(ControlCommand::History {
                process: "api-server".into(),
                by_id: false,
                since_minutes: None,
                limit: Some(2),
            })
            .unwrap();
        let ControlResponse::Records(records) = response else {
            panic!("expected records response");
        };
        assert_eq!(records.len(), 2);
        assert!(records[0].collected_at < records[1].collected_at);

        let response = engine
            .handle_command(ControlCommand::History {
                process: "0".into(),
                by_id: true,
                since_minutes: None,
                limit: None,
            })
            .unwrap();
        let ControlResponse::Records(records) = response else {
            panic!("expected records response");
        };
        assert_eq!(records.len(), 3);
    }
}
