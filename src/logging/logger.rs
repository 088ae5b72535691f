//! Structured logger and end-of-run summary.
use std::path::PathBuf;

use super::subscriber::{NOOP_TARGET, STAGE_TARGET};
use super::types::Log;
use super::utils::log_file_path;
use crate::engine::{Outcome, RunReport};

/// Implement the methods of [`Log`] by delegating to inherent methods of the
/// same name on the implementing type.
macro_rules! forward_log_methods {
    ($($method:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                self.$method(msg);
            }
        )+
    };
}

/// Logger writing through `tracing`.
///
/// Console formatting and the persistent log file at
/// `$XDG_CACHE_HOME/asfyaml/<command>.log` are handled by the subscriber
/// installed with [`init_subscriber`](super::subscriber::init_subscriber);
/// this type only remembers the file location for the summary.
#[derive(Debug)]
pub struct Logger {
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Create a logger for `command`.
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            log_file: log_file_path(command),
        }
    }

    /// Path of the persistent log file, if the cache directory is usable.
    #[must_use]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Log an error message.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    /// Log a stage header (major section).
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: STAGE_TARGET, "{msg}");
    }

    /// Log an informational message.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message (suppressed on console unless verbose).
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// Log a change that was planned but not applied.
    pub fn noop(&self, msg: &str) {
        tracing::info!(target: NOOP_TARGET, "{msg}");
    }

    /// Print the per-feature summary of a run.
    pub fn print_report(&self, report: &RunReport) {
        if report.entries.is_empty() {
            return;
        }

        println!();
        self.stage(&format!("Summary ({})", report.environment));

        let planned = report.environment.is_restricted();
        for entry in &report.entries {
            let (icon, color, suffix) = match &entry.outcome {
                Outcome::Success if entry.changes.is_empty() => {
                    ("✓", "\x1b[32m", " (unchanged)".to_string())
                }
                Outcome::Success if planned => (
                    "~",
                    "\x1b[37m",
                    format!(" ({} planned)", entry.changes.len()),
                ),
                Outcome::Success => (
                    "✓",
                    "\x1b[32m",
                    format!(" ({} applied)", entry.changes.len()),
                ),
                Outcome::Skipped(reason) => ("○", "\x1b[33m", format!(" ({reason})")),
                Outcome::Failed(err) if entry.changes.is_empty() => {
                    ("✗", "\x1b[31m", format!(" ({})", err.message))
                }
                Outcome::Failed(err) => (
                    "✗",
                    "\x1b[31m",
                    format!(" ({} after {} applied)", err.message, entry.changes.len()),
                ),
            };
            self.info(&format!("{color}{icon} {}{suffix}\x1b[0m", entry.feature));
        }

        let counts = report.counts();
        println!();
        self.info(&format!(
            "{} features: \x1b[32m{} ok\x1b[0m, \x1b[33m{} skipped\x1b[0m, \x1b[31m{} failed\x1b[0m",
            report.entries.len(),
            counts.success,
            counts.skipped,
            counts.failed,
        ));
        if !report.warnings.is_empty() {
            self.info(&format!(
                "\x1b[33m{} warning(s)\x1b[0m",
                report.warnings.len()
            ));
        }

        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }
}

impl Log for Logger {
    forward_log_methods!(stage, info, debug, warn, error, noop);
}
