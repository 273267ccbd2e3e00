use std::{error::Error, fs, io};

use chrono::{Duration, Utc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use procpulse::{
    cli::{Cli, Commands, parse_args},
    config::{Config, SourceKind, load_config},
    engine::Engine,
    history::{HistoryStore, ProcessSelector},
    ipc::{self, ControlCommand, ControlError, ControlResponse},
    logs::{FileLogSource, LogSource, SupervisorLogSource},
    monitor::Monitor,
    runtime,
    status::StatusRenderer,
};

fn main() {
    let args = parse_args();
    init_logging(&args);

    if let Err(err) = run(args) {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run(args: Cli) -> Result<(), Box<dyn Error>> {
    match args.command {
        Commands::Watch { config } => {
            let config = load_config(Some(&config))?;
            let engine = Engine::from_config(&config)?;
            register_shutdown_handler()?;
            engine.run()?;
        }
        Commands::Start { interval, json } => {
            let command = ControlCommand::StartMonitoring {
                interval_minutes: interval,
            };
            match send_to_engine(&command)? {
                Some(ControlResponse::Session(session)) => {
                    StatusRenderer::new(json, false).render_session(&session);
                }
                Some(other) => return Err(unexpected_response(other)),
                None => {
                    warn!("No running engine; start one with `ppulse watch`");
                }
            }
        }
        Commands::Stop { json } => match send_to_engine(&ControlCommand::StopMonitoring)? {
            Some(ControlResponse::Session(session)) => {
                StatusRenderer::new(json, false).render_session(&session);
            }
            Some(other) => return Err(unexpected_response(other)),
            None => {
                warn!("No running engine; nothing to stop");
            }
        },
        Commands::Status { json, no_color } => {
            match send_to_engine(&ControlCommand::Status)? {
                Some(ControlResponse::Summary(summary)) => {
                    StatusRenderer::new(json, no_color).render_summary(&summary);
                }
                Some(other) => return Err(unexpected_response(other)),
                None => {
                    warn!(
                        "No running engine; start one with `ppulse watch` or run `ppulse collect`"
                    );
                }
            }
        }
        Commands::Collect {
            config,
            json,
            no_color,
        } => {
            let renderer = StatusRenderer::new(json, no_color);
            match send_to_engine(&ControlCommand::Collect)? {
                Some(ControlResponse::Cycle(report)) => renderer.render_cycle(&report),
                Some(other) => return Err(unexpected_response(other)),
                None => {
                    // No resident engine: run one local cycle through the
                    // same pipeline, writing through to persisted history.
                    let config = load_config(Some(&config))?;
                    let report = collect_locally(&config)?;
                    renderer.render_cycle(&report);
                }
            }
        }
        Commands::History {
            process,
            by_id,
            since_minutes,
            limit,
            config,
            json,
        } => {
            let command = ControlCommand::History {
                process: process.clone(),
                by_id,
                since_minutes,
                limit,
            };
            let renderer = StatusRenderer::new(json, false);
            match send_to_engine(&command)? {
                Some(ControlResponse::Records(records)) => {
                    renderer.render_records(&records);
                }
                Some(other) => return Err(unexpected_response(other)),
                None => {
                    let records = query_persisted_history(
                        config.as_deref(),
                        &process,
                        by_id,
                        since_minutes,
                        limit,
                    )?;
                    renderer.render_records(&records);
                }
            }
        }
        Commands::Logs {
            process,
            config,
            lines,
            clear,
        } => {
            let config = load_config(Some(&config)).ok();
            let source = build_log_source(config.as_ref());
            if clear {
                source.clear(&process)?;
                info!("Cleared logs for '{process}'");
            } else {
                for line in source.fetch(&process, lines)? {
                    println!("{line}");
                }
            }
        }
        Commands::Shutdown => match send_to_engine(&ControlCommand::Shutdown)? {
            Some(ControlResponse::Message(message)) => println!("{message}"),
            Some(ControlResponse::Ok) => {}
            Some(other) => return Err(unexpected_response(other)),
            None => {
                warn!("No running engine; nothing to shut down");
            }
        },
        Commands::Purge => {
            let state_dir = runtime::state_dir();
            if state_dir.exists() {
                fs::remove_dir_all(&state_dir)?;
                println!("Removed {}", state_dir.display());
            } else {
                println!("Nothing to purge");
            }
        }
    }

    Ok(())
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Diagnostics go to stderr so `--json` output stays parseable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Sends a command to the resident engine. `Ok(None)` means no engine is
/// reachable; a stale socket left by a crashed engine is cleaned up.
fn send_to_engine(
    command: &ControlCommand,
) -> Result<Option<ControlResponse>, Box<dyn Error>> {
    match ipc::send_command(command) {
        Ok(response) => Ok(Some(response)),
        Err(ControlError::NotAvailable) => Ok(None),
        Err(ControlError::Io(err))
            if matches!(
                err.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            let _ = ipc::cleanup_runtime();
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

fn unexpected_response(response: ControlResponse) -> Box<dyn Error> {
    format!("unexpected engine response: {response:?}").into()
}

/// One-shot cycle without a resident engine: same collector → scorer →
/// store pipeline, same persistence medium.
fn collect_locally(
    config: &Config,
) -> Result<procpulse::monitor::CycleReport, Box<dyn Error>> {
    let store = if config.persistence.enabled {
        HistoryStore::with_persistence(
            config.retention.policy(),
            config.persistence.resolve_directory(),
        )?
    } else {
        HistoryStore::new(config.retention.policy())
    };

    let monitor = Monitor::new(config.source.build(), store, config.monitor.thresholds());
    Ok(monitor.collect_now()?)
}

/// History fallback when no engine is running: read whatever series the
/// persistence medium holds.
fn query_persisted_history(
    config_path: Option<&str>,
    process: &str,
    by_id: bool,
    since_minutes: Option<i64>,
    limit: Option<usize>,
) -> Result<Vec<procpulse::score::HealthRecord>, Box<dyn Error>> {
    let config = config_path
        .map(|path| load_config(Some(path)))
        .transpose()?;

    let (policy, directory) = match &config {
        Some(config) => (
            config.retention.policy(),
            config.persistence.resolve_directory(),
        ),
        None => (Default::default(), runtime::history_dir()),
    };

    let store = HistoryStore::with_persistence(policy, directory)?;
    let selector = if by_id {
        ProcessSelector::Id(process.to_string())
    } else {
        ProcessSelector::Name(process.to_string())
    };
    let since = since_minutes.map(|minutes| Utc::now() - Duration::minutes(minutes));

    let mut records: Vec<_> = store.query(&selector, since).cloned().collect();
    if let Some(limit) = limit
        && records.len() > limit
    {
        records.drain(..records.len() - limit);
    }
    Ok(records)
}

/// Log retrieval mirrors the snapshot source: supervisor-backed installs
/// ask the supervisor, everything else tails log files.
fn build_log_source(config: Option<&Config>) -> Box<dyn LogSource> {
    match config {
        Some(config)
            if config.source.kind == SourceKind::Supervisor
                && !config.source.command.is_empty() =>
        {
            Box::new(SupervisorLogSource::new(config.source.command[0].clone()))
        }
        Some(config) => Box::new(FileLogSource::new(config.logs.resolve_directory())),
        None => Box::new(FileLogSource::new(runtime::log_dir())),
    }
}

/// Forwards ctrl-c to the engine's own control socket so the accept loop
/// unwinds and shuts down cleanly.
fn register_shutdown_handler() -> Result<(), Box<dyn Error>> {
    ctrlc::set_handler(move || {
        println!("procpulse is shutting down...");
        let _ = ipc::send_command(&ControlCommand::Shutdown);
    })?;

    Ok(())
}
