//! Core logging types: the [`Log`] trait and captured entries.

/// Severity or kind of a captured log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// Stage header.
    Stage,
    /// Informational message.
    Info,
    /// Debug detail.
    Debug,
    /// Warning.
    Warn,
    /// Error.
    Error,
    /// A change that would have been applied outside the `noop` environment.
    Noop,
}

/// A message captured by [`MemoryLog`](super::memory::MemoryLog).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Kind of message.
    pub kind: LogKind,
    /// Message text.
    pub message: String,
}

/// Abstraction over logging backends.
///
/// [`Logger`](super::logger::Logger) writes through `tracing`;
/// [`MemoryLog`](super::memory::MemoryLog) captures messages so callers can
/// inspect what a feature reported.
pub trait Log: Send + Sync {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log a change that is only planned because the run is restricted.
    fn noop(&self, msg: &str);
}
