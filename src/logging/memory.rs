//! In-memory logger that captures messages instead of printing them.
use std::sync::Mutex;

use super::types::{Log, LogEntry, LogKind};

/// Implement the methods of [`Log`] by pushing a [`LogEntry`] of the matching
/// kind and forwarding the message to `tracing` at debug level.
macro_rules! capture_log_methods {
    ($($method:ident => $kind:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                tracing::debug!(target: "asfyaml::capture", "{msg}");
                if let Ok(mut guard) = self.entries.lock() {
                    guard.push(LogEntry {
                        kind: LogKind::$kind,
                        message: msg.to_string(),
                    });
                }
            }
        )+
    };
}

/// Logger that records every message in order.
///
/// Used when a caller wants to inspect feature output after the fact, such as
/// the `validate` command collecting warnings or tests asserting that a
/// restricted run only planned its changes.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLog {
    /// Create an empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured entries in emission order.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().map_or_else(|_| vec![], |g| g.clone())
    }

    /// Messages of a single kind in emission order.
    #[must_use]
    pub fn messages(&self, kind: LogKind) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.message)
            .collect()
    }

    /// Whether any message of `kind` contains `needle`.
    #[must_use]
    pub fn contains(&self, kind: LogKind, needle: &str) -> bool {
        self.messages(kind).iter().any(|m| m.contains(needle))
    }
}

impl Log for MemoryLog {
    capture_log_methods! {
        stage => Stage,
        info  => Info,
        debug => Debug,
        warn  => Warn,
        error => Error,
        noop  => Noop,
    }
}
