//! Command-line interface for procpulse.
use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// Wrapper around `LevelFilter` so clap can parse log levels from either
/// string names ("info", "debug", etc.) or numeric shorthands (0-5).
#[derive(Clone, Copy, Debug)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        if let Ok(number) = trimmed.parse::<u8>() {
            let level = match number {
                0 => LevelFilter::OFF,
                1 => LevelFilter::ERROR,
                2 => LevelFilter::WARN,
                3 => LevelFilter::INFO,
                4 => LevelFilter::DEBUG,
                5 => LevelFilter::TRACE,
                _ => {
                    return Err(format!(
                        "unsupported log level number '{number}' (expected 0-5)"
                    ));
                }
            };

            return Ok(LogLevelArg(level));
        }

        let lowercase = trimmed.to_ascii_lowercase();
        let level = match lowercase.as_str() {
            "off" => Some(LevelFilter::OFF),
            "error" | "err" => Some(LevelFilter::ERROR),
            "warn" | "warning" => Some(LevelFilter::WARN),
            "info" | "information" => Some(LevelFilter::INFO),
            "debug" => Some(LevelFilter::DEBUG),
            "trace" => Some(LevelFilter::TRACE),
            _ => None,
        }
        .ok_or_else(|| format!("invalid log level '{trimmed}'"))?;

        Ok(LogLevelArg(level))
    }
}

/// Command-line interface for procpulse.
#[derive(Parser)]
#[command(name = "procpulse", version, author)]
#[command(about = "Health monitoring engine for supervised processes", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for procpulse.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the resident engine in the foreground (ctrl-c to shut down).
    Watch {
        /// Path to the configuration file (defaults to `procpulse.yaml`).
        #[arg(short, long, default_value = "procpulse.yaml")]
        config: String,
    },

    /// Start scheduled monitoring on the resident engine. Idempotent.
    Start {
        /// Interval override in minutes (defaults to the engine's config).
        #[arg(short, long, value_name = "MINUTES")]
        interval: Option<u64>,

        /// Emit machine-readable JSON output.
        #[arg(long)]
        json: bool,
    },

    /// Stop scheduled monitoring; the cached summary stays readable.
    Stop {
        /// Emit machine-readable JSON output.
        #[arg(long)]
        json: bool,
    },

    /// Show the current fleet status summary.
    Status {
        /// Emit machine-readable JSON output instead of a table.
        #[arg(long)]
        json: bool,

        /// Disable ANSI colors in output.
        #[arg(long = "no-color")]
        no_color: bool,
    },

    /// Run one manual collection cycle.
    Collect {
        /// Path to the configuration file, used when no engine is running
        /// (defaults to `procpulse.yaml`).
        #[arg(short, long, default_value = "procpulse.yaml")]
        config: String,

        /// Emit machine-readable JSON output.
        #[arg(long)]
        json: bool,

        /// Disable ANSI colors in output.
        #[arg(long = "no-color")]
        no_color: bool,
    },

    /// Query health history for a process.
    History {
        /// Process name, or supervisor identifier with `--id`.
        process: String,

        /// Select by supervisor-assigned identifier instead of name.
        #[arg(long = "id")]
        by_id: bool,

        /// Only records from the trailing window of this many minutes.
        #[arg(long, value_name = "MINUTES")]
        since_minutes: Option<i64>,

        /// Keep only the newest N records.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Path to the configuration file, used when no engine is running.
        #[arg(short, long)]
        config: Option<String>,

        /// Emit machine-readable JSON output.
        #[arg(long)]
        json: bool,
    },

    /// Show logs for a supervised process.
    Logs {
        /// The process whose logs should be displayed.
        process: String,

        /// Path to the configuration file (defaults to `procpulse.yaml`).
        #[arg(short, long, default_value = "procpulse.yaml")]
        config: String,

        /// Number of lines to show (default: 50).
        #[arg(short, long, default_value = "50")]
        lines: usize,

        /// Discard the process's accumulated logs instead of showing them.
        #[arg(long)]
        clear: bool,
    },

    /// Shut the resident engine down.
    Shutdown,

    /// Purge all procpulse state and runtime files.
    Purge,
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
