//! Status presentation for the CLI.
use terminal_size::{Width, terminal_size};

use crate::{
    monitor::{CycleReport, MonitoringSession, SessionState, StatusSummary},
    score::HealthRecord,
};

const GREEN_BOLD: &str = "\x1b[1;32m"; // Bright Green
const RED_BOLD: &str = "\x1b[1;31m"; // Bright Red
const MAGENTA_BOLD: &str = "\x1b[1;35m"; // Magenta
const YELLOW_BOLD: &str = "\x1b[1;33m"; // Yellow/Gold
const RESET: &str = "\x1b[0m"; // Reset color

const MIN_NAME_WIDTH: usize = 12;
const MAX_NAME_WIDTH: usize = 40;

/// Renders summaries, cycles, sessions, and history for the terminal.
pub struct StatusRenderer {
    json: bool,
    no_color: bool,
}

impl StatusRenderer {
    /// Creates a renderer. `json` wins over table output; `no_color`
    /// strips ANSI sequences.
    pub fn new(json: bool, no_color: bool) -> Self {
        Self { json, no_color }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            format!("{color}{text}{RESET}")
        }
    }

    /// Shows the cached status summary.
    pub fn render_summary(&self, summary: &StatusSummary) {
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(summary).unwrap_or_else(|_| "{}".into())
            );
            return;
        }

        let Some(generated_at) = summary.generated_at else {
            println!("No collection cycle has completed yet.");
            return;
        };

        if !summary.supervisor_available
            && let Some(failure) = &summary.last_failure
        {
            println!(
                "{} (since {}: {})",
                self.paint(YELLOW_BOLD, "Supervisor unavailable; showing stale data"),
                failure.at.format("%Y-%m-%d %H:%M:%S UTC"),
                failure.reason
            );
        }

        println!(
            "Fleet status as of {}:",
            generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        for record in &summary.processes {
            self.render_record_line(record);
        }
        if summary.processes.is_empty() {
            println!("  (no supervised processes)");
        }

        println!(
            "{} total, {} healthy, {} with issues, average score {:.1}",
            summary.total, summary.healthy, summary.with_issues, summary.average_score
        );

        if let Some(system) = &summary.system {
            println!(
                "Host: {} cpus, load {:.2}/{:.2}/{:.2}, memory {} / {}",
                system.cpu_count,
                system.load_one,
                system.load_five,
                system.load_fifteen,
                format_bytes(system.used_memory_bytes),
                format_bytes(system.total_memory_bytes),
            );
        }
    }

    /// Shows the outcome of one manual collection cycle.
    pub fn render_cycle(&self, report: &CycleReport) {
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".into())
            );
            return;
        }

        println!(
            "Collected {} processes ({} healthy, average score {:.1})",
            report.records.len(),
            report.healthy_count(),
            report.average_score()
        );
        for record in &report.records {
            self.render_record_line(record);
        }
        if report.skipped_entries > 0 {
            println!(
                "{}",
                self.paint(
                    YELLOW_BOLD,
                    &format!("Skipped {} malformed entries", report.skipped_entries)
                )
            );
        }
        if report.memory_only_writes > 0 {
            println!(
                "{}",
                self.paint(
                    YELLOW_BOLD,
                    &format!(
                        "{} records kept in memory only (persistence failed)",
                        report.memory_only_writes
                    )
                )
            );
        }
        if report.rejected_writes > 0 {
            println!(
                "{}",
                self.paint(
                    RED_BOLD,
                    &format!("{} out-of-order writes rejected", report.rejected_writes)
                )
            );
        }
    }

    /// Shows the scheduler session.
    pub fn render_session(&self, session: &MonitoringSession) {
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(session).unwrap_or_else(|_| "{}".into())
            );
            return;
        }

        let state = match session.state {
            SessionState::Running => self.paint(GREEN_BOLD, "running"),
            SessionState::Stopped => self.paint(MAGENTA_BOLD, "stopped"),
        };
        let last = session
            .last_cycle_at
            .map(|at| {
                let elapsed = (chrono::Utc::now() - at).num_seconds().max(0) as u64;
                format!("last cycle {}", format_elapsed(elapsed))
            })
            .unwrap_or_else(|| "no cycle completed yet".into());
        println!(
            "Monitoring {state} ({}m interval); {last}",
            session.interval_minutes
        );
    }

    /// Shows queried history records.
    pub fn render_records(&self, records: &[HealthRecord]) {
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(records).unwrap_or_else(|_| "[]".into())
            );
            return;
        }

        if records.is_empty() {
            println!("No matching history records.");
            return;
        }

        for record in records {
            println!(
                "{}  {}",
                record.collected_at.format("%Y-%m-%d %H:%M:%S"),
                self.record_line(record)
            );
        }
    }

    fn render_record_line(&self, record: &HealthRecord) {
        println!("  {}", self.record_line(record));
    }

    fn record_line(&self, record: &HealthRecord) -> String {
        let name_width = name_column_width();
        let name = truncate(&record.name, name_width);

        let score = format!("{:5.1}", display_score(record.health_score));
        let score = if record.is_healthy && record.issues.is_empty() {
            self.paint(GREEN_BOLD, &score)
        } else if record.is_healthy {
            self.paint(YELLOW_BOLD, &score)
        } else {
            self.paint(RED_BOLD, &score)
        };

        let issues = if record.issues.is_empty() {
            "-".to_string()
        } else {
            record
                .issues
                .iter()
                .map(|issue| issue.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };

        format!(
            "● {name:<name_width$} [{}] {score}  {issues}",
            record.process_id
        )
    }
}

/// Clamp for display only; stored scores are already bounded, but raw CPU
/// figures flowing through record lines are not.
fn display_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

fn truncate(text: &str, width: usize) -> String {
    if text.len() <= width {
        text.to_string()
    } else {
        format!("{}…", &text[..width.saturating_sub(1)])
    }
}

/// Name column width derived from the terminal, clamped to sane bounds.
fn name_column_width() -> usize {
    let width = terminal_size()
        .map(|(Width(w), _)| w as usize)
        .unwrap_or(80);
    (width / 4).clamp(MIN_NAME_WIDTH, MAX_NAME_WIDTH)
}

/// Formats a byte count for humans.
pub fn format_bytes(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    let bytes = bytes as f64;
    if bytes >= GIB {
        format!("{:.1}G", bytes / GIB)
    } else {
        format!("{:.1}M", bytes / MIB)
    }
}

/// Formats elapsed seconds as a coarse human-readable age.
pub fn format_elapsed(total_seconds: u64) -> String {
    match total_seconds {
        0..=59 => format!("{} secs ago", total_seconds),
        60..=3_599 => format!("{} mins ago", total_seconds / 60),
        3_600..=86_399 => format!("{} hours ago", total_seconds / 3_600),
        86_400..=604_799 => format!("{} days ago", total_seconds / 86_400),
        _ => format!("{} weeks ago", total_seconds / 604_800),
    }
}
