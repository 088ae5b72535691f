//! Tracing subscriber setup.
//!
//! Events are mapped back onto [`LogKind`] once, from their level and
//! target, and rendered twice: coloured for the console and time-stamped for
//! the per-command log file.
use std::fs;
use std::io::Write as _;
use std::sync::Mutex;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

use super::types::LogKind;
use super::utils::{format_utc_datetime, format_utc_time, log_file_path, strip_ansi};

/// Target for stage headers.
pub const STAGE_TARGET: &str = "asfyaml::stage";
/// Target for planned-but-not-applied changes.
pub const NOOP_TARGET: &str = "asfyaml::noop";

/// Kind of message an event was emitted as by [`Logger`](super::Logger).
fn classify(level: Level, target: &str) -> LogKind {
    match (level, target) {
        (Level::ERROR, _) => LogKind::Error,
        (Level::WARN, _) => LogKind::Warn,
        (Level::INFO, STAGE_TARGET) => LogKind::Stage,
        (Level::INFO, NOOP_TARGET) => LogKind::Noop,
        (Level::INFO, _) => LogKind::Info,
        _ => LogKind::Debug,
    }
}

/// The `message` field of an event.
fn message_of(event: &Event<'_>) -> String {
    #[derive(Default)]
    struct Message(String);

    impl Visit for Message {
        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }

        fn record_str(&mut self, field: &Field, value: &str) {
            if field.name() == "message" {
                self.0 = value.to_string();
            }
        }
    }

    let mut message = Message::default();
    event.record(&mut message);
    message.0
}

fn console_line(kind: LogKind, msg: &str) -> String {
    match kind {
        LogKind::Error => format!("\x1b[31mERROR\x1b[0m {msg}"),
        LogKind::Warn => format!("\x1b[33mWARN\x1b[0m  {msg}"),
        LogKind::Stage => format!("\x1b[1;34m==>\x1b[0m \x1b[1m{msg}\x1b[0m"),
        LogKind::Noop => format!("  \x1b[33m[NOOP]\x1b[0m {msg}"),
        LogKind::Info => format!("  {msg}"),
        LogKind::Debug => format!("  \x1b[2m{msg}\x1b[0m"),
    }
}

fn file_line(kind: LogKind, ts: &str, msg: &str) -> String {
    let msg = strip_ansi(msg);
    let tag = match kind {
        LogKind::Stage => return format!("[{ts}] ==> {msg}"),
        LogKind::Info => return format!("[{ts}]     {msg}"),
        LogKind::Noop => "noop",
        LogKind::Error => "error",
        LogKind::Warn => "warn",
        LogKind::Debug => "debug",
    };
    format!("[{ts}]     [{tag}] {msg}")
}

fn file_header(command: &str, started: &str) -> String {
    let version =
        option_env!("ASFYAML_VERSION").unwrap_or(concat!("dev-", env!("CARGO_PKG_VERSION")));
    let rule = "=".repeat(42);
    format!("{rule}\nasfyaml {version} {command} {started}\n{rule}\n")
}

/// Layer appending every event to `<cache>/asfyaml/<command>.log`, ANSI
/// stripped. Captures debug regardless of console verbosity.
#[derive(Debug)]
pub(super) struct FileLayer {
    file: Mutex<fs::File>,
}

impl FileLayer {
    /// Truncate the log file for `command` and write the run header.
    ///
    /// Returns `None` if the cache directory or the file is unavailable.
    pub(super) fn new(command: &str) -> Option<Self> {
        let path = log_file_path(command)?;
        fs::write(&path, file_header(command, &format_utc_datetime())).ok()?;
        let file = fs::OpenOptions::new().append(true).open(&path).ok()?;
        Some(Self {
            file: Mutex::new(file),
        })
    }
}

impl<S: Subscriber> tracing_subscriber::Layer<S> for FileLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let kind = classify(*metadata.level(), metadata.target());
        let line = file_line(kind, &format_utc_time(), &message_of(event));
        if let Ok(mut f) = self.file.lock() {
            writeln!(f, "{line}").ok();
        }
    }
}

/// Console rendering of [`LogKind`]s.
struct ConsoleFormatter;

impl<S, N> FormatEvent<S, N> for ConsoleFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let kind = classify(*metadata.level(), metadata.target());
        writeln!(writer, "{}", console_line(kind, &message_of(event)))
    }
}

/// Initialise the global [`tracing`] subscriber.
///
/// Console output goes to stdout (info) and stderr (warnings and errors);
/// debug only appears with `verbose`. Every event at debug and above is also
/// appended to `$XDG_CACHE_HOME/asfyaml/<command>.log`.
/// Must be called once at program startup, before any logging.
pub fn init_subscriber(verbose: bool, command: &str) {
    use tracing_subscriber::Layer as _;
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let console_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let make_writer = std::io::stderr
        .with_max_level(Level::WARN)
        .and(std::io::stdout.with_min_level(Level::INFO));

    let console_layer = tracing_subscriber::fmt::layer()
        .event_format(ConsoleFormatter)
        .with_writer(make_writer)
        .with_filter(console_level);

    let file_layer = FileLayer::new(command).map(|l| l.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
}
