//! The structured logger handle that records are written through.

use std::{
    fmt,
    str::FromStr,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::Dispatch;
use tracing_subscriber::{
    fmt::{writer::BoxMakeWriter, MakeWriter},
    layer::SubscriberExt,
};

use crate::{
    params::LoggerOptions,
    record::{LogArgs, LogRecord},
    subscriber::JsonLogLayer,
    JsonStorageLayer,
};

/// Severity of a log record.
///
/// The numeric values are the ones written in the `level` field of every
/// JSON record. `Silent` is only meaningful as a threshold: it disables all
/// output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum Level {
    Trace = 10,
    Debug = 20,
    Info = 30,
    Warn = 40,
    Error = 50,
    Fatal = 60,
    Silent = 100,
}

impl Level {
    /// The numeric severity written to records.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0..=10 => Level::Trace,
            11..=20 => Level::Debug,
            21..=30 => Level::Info,
            31..=40 => Level::Warn,
            41..=50 => Level::Error,
            51..=60 => Level::Fatal,
            _ => Level::Silent,
        }
    }

    pub(crate) fn from_tracing(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => Level::Error,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::INFO => Level::Info,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::TRACE => Level::Trace,
        }
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::Info
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
            Level::Silent => "silent",
        };
        f.write_str(name)
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            "silent" => Ok(Level::Silent),
            other => Err(format!("unknown log level `{}`", other)),
        }
    }
}

/// A threshold shared by an engine and every logger derived from it.
///
/// Changing it through any handle affects all of them, which is how the
/// root logger adjusts verbosity at runtime.
#[derive(Clone, Debug)]
pub struct LevelHandle(Arc<AtomicU8>);

impl LevelHandle {
    /// Create a handle starting at `level`.
    pub fn new(level: Level) -> Self {
        Self(Arc::new(AtomicU8::new(level.as_u8())))
    }

    /// The current threshold.
    pub fn get(&self) -> Level {
        Level::from_u8(self.0.load(Ordering::Relaxed))
    }

    /// Replace the threshold.
    pub fn set(&self, level: Level) {
        self.0.store(level.as_u8(), Ordering::Relaxed);
    }

    /// Whether a record with the numeric `severity` passes the threshold.
    pub fn enabled(&self, severity: u8) -> bool {
        let threshold = self.0.load(Ordering::Relaxed);
        threshold != Level::Silent.as_u8() && severity >= threshold
    }
}

/// Where an engine writes its JSON lines.
///
/// This is a cloneable wrapper around any [`MakeWriter`], so the same
/// destination can be shared by everything built from one set of
/// parameters.
#[derive(Clone)]
pub struct Destination(Arc<BoxMakeWriter>);

impl Destination {
    /// Wrap a writer factory.
    pub fn new<M>(make_writer: M) -> Self
    where
        M: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        Self(Arc::new(BoxMakeWriter::new(make_writer)))
    }

    /// Write to the process' standard output.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout)
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Destination").finish()
    }
}

impl<'a> MakeWriter<'a> for Destination {
    type Writer = <BoxMakeWriter as MakeWriter<'a>>::Writer;

    fn make_writer(&'a self) -> Self::Writer {
        self.0.make_writer()
    }
}

/// A structured logger instance.
///
/// Every `Logger` belongs to an engine: a `tracing` [`Dispatch`] that turns
/// records into output, plus a shared [`LevelHandle`]. Loggers derived with
/// [`Logger::child`] share the engine and carry extra bound fields that are
/// written with every record.
#[derive(Clone, Debug)]
pub struct Logger {
    dispatch: Dispatch,
    level: LevelHandle,
    message_key: Arc<str>,
    bindings: Arc<Map<String, Value>>,
}

impl Logger {
    /// Build an engine writing JSON lines to standard output.
    pub fn new(options: &LoggerOptions) -> Self {
        Self::with_destination(options, Destination::stdout())
    }

    /// Build an engine writing JSON lines to `destination`.
    pub fn with_destination(options: &LoggerOptions, destination: Destination) -> Self {
        let level = LevelHandle::new(options.level);
        let layer = JsonLogLayer::new(destination, level.clone())
            .with_name(options.name.clone())
            .with_message_key(&options.message_key)
            .with_base(options.base.clone().unwrap_or_default())
            .with_timestamp(options.timestamp);
        let subscriber = tracing_subscriber::registry()
            .with(JsonStorageLayer)
            .with(layer);

        Self {
            dispatch: Dispatch::new(subscriber),
            level,
            message_key: Arc::from(options.message_key.as_str()),
            bindings: Arc::new(Map::new()),
        }
    }

    /// Wrap a subscriber that was configured elsewhere.
    ///
    /// Records are still emitted as `tracing` events; their fields travel
    /// as a JSON object in the `scope.record` field, which [`JsonLogLayer`]
    /// flattens and other subscribers show verbatim.
    pub fn from_dispatch(dispatch: Dispatch) -> Self {
        Self {
            dispatch,
            level: LevelHandle::new(Level::Trace),
            message_key: Arc::from("msg"),
            bindings: Arc::new(Map::new()),
        }
    }

    /// Derive a logger that writes `bindings` with every record.
    ///
    /// Bindings accumulate: the child keeps its parent's bindings, and new
    /// values win on key collisions.
    pub fn child(&self, bindings: Map<String, Value>) -> Self {
        let mut merged = (*self.bindings).clone();
        merged.extend(bindings);
        Self {
            dispatch: self.dispatch.clone(),
            level: self.level.clone(),
            message_key: Arc::clone(&self.message_key),
            bindings: Arc::new(merged),
        }
    }

    /// Fields bound to this logger.
    pub fn bindings(&self) -> &Map<String, Value> {
        &self.bindings
    }

    /// The `tracing` dispatcher records are sent to.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// The key the message is written under.
    pub fn message_key(&self) -> &str {
        &self.message_key
    }

    /// The current threshold of this logger's engine.
    pub fn level(&self) -> Level {
        self.level.get()
    }

    /// Change the threshold of this logger's engine, affecting every logger
    /// that shares it.
    pub fn set_level(&self, level: Level) {
        self.level.set(level);
    }

    /// Whether a record at `level` would be written.
    pub fn is_level_enabled(&self, level: Level) -> bool {
        level != Level::Silent && self.level.enabled(level.as_u8())
    }

    /// Log at `level`.
    pub fn log(&self, level: Level, args: impl Into<LogArgs>) {
        if self.is_level_enabled(level) {
            self.write(level, args.into().into_record());
        }
    }

    /// Log at trace level.
    pub fn trace(&self, args: impl Into<LogArgs>) {
        self.log(Level::Trace, args)
    }

    /// Log at debug level.
    pub fn debug(&self, args: impl Into<LogArgs>) {
        self.log(Level::Debug, args)
    }

    /// Log at info level.
    pub fn info(&self, args: impl Into<LogArgs>) {
        self.log(Level::Info, args)
    }

    /// Log at warn level.
    pub fn warn(&self, args: impl Into<LogArgs>) {
        self.log(Level::Warn, args)
    }

    /// Log at error level.
    pub fn error(&self, args: impl Into<LogArgs>) {
        self.log(Level::Error, args)
    }

    /// Log at fatal level.
    pub fn fatal(&self, args: impl Into<LogArgs>) {
        self.log(Level::Fatal, args)
    }

    /// Write an already normalized record.
    pub fn write(&self, level: Level, record: LogRecord) {
        if !self.is_level_enabled(level) {
            return;
        }

        let mut fields = (*self.bindings).clone();
        fields.extend(record.fields);
        let text = match &record.message {
            Some(Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        if let Some(message) = record.message {
            fields.insert(self.message_key.to_string(), message);
        }

        // If there is an error, just squash it quietly. After all, if we
        // failed to log, we can't exactly log an error.
        let payload = match serde_json::to_string(&fields) {
            Ok(payload) => payload,
            Err(_) => return,
        };
        self.emit(level, &payload, &text);
    }

    fn emit(&self, level: Level, payload: &str, text: &str) {
        let severity = u64::from(level.as_u8());
        tracing::dispatcher::with_default(&self.dispatch, || match level {
            Level::Trace => tracing::event!(
                parent: None,
                tracing::Level::TRACE,
                scope.severity = severity,
                scope.record = payload,
                "{}",
                text
            ),
            Level::Debug => tracing::event!(
                parent: None,
                tracing::Level::DEBUG,
                scope.severity = severity,
                scope.record = payload,
                "{}",
                text
            ),
            Level::Info => tracing::event!(
                parent: None,
                tracing::Level::INFO,
                scope.severity = severity,
                scope.record = payload,
                "{}",
                text
            ),
            Level::Warn => tracing::event!(
                parent: None,
                tracing::Level::WARN,
                scope.severity = severity,
                scope.record = payload,
                "{}",
                text
            ),
            Level::Error | Level::Fatal => tracing::event!(
                parent: None,
                tracing::Level::ERROR,
                scope.severity = severity,
                scope.record = payload,
                "{}",
                text
            ),
            Level::Silent => {}
        });
    }
}
