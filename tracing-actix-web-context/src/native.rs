//! A logger facade with the framework's conventional call shape.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use crate::{
    logger::Level,
    params::Params,
    record::{ErrorInfo, LogArgs},
    structured::StructuredLogger,
};

lazy_static! {
    static ref STACK_FORMAT: Regex = Regex::new(r"^.+\n\s+at .+:\d+:\d+").unwrap();
}

/// A positional argument of a [`NativeLogger`] call.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    /// Text. As the last argument, it is taken as the label.
    Str(String),
    /// A structured message.
    Object(Map<String, Value>),
    /// An error, logged as its stack.
    Error(ErrorInfo),
    /// Any other value, logged as its JSON text.
    Value(Value),
    /// A missing value.
    Undefined,
}

impl Arg {
    /// Wrap an error.
    pub fn error<E: std::error::Error>(error: &E) -> Self {
        Arg::Error(ErrorInfo::new(error))
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Str(s)
    }
}

impl From<Map<String, Value>> for Arg {
    fn from(map: Map<String, Value>) -> Self {
        Arg::Object(map)
    }
}

impl From<ErrorInfo> for Arg {
    fn from(error: ErrorInfo) -> Self {
        Arg::Error(error)
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Arg::Str(s),
            Value::Object(map) => Arg::Object(map),
            other => Arg::Value(other),
        }
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        value.map_or(Arg::Undefined, Into::into)
    }
}

/// Whether `value` looks like a stack trace rather than a label.
fn is_stack_format(value: &Arg) -> bool {
    matches!(value, Arg::Str(s) if STACK_FORMAT.is_match(s))
}

/// Take a trailing label off `args`, when there is more than one argument.
fn split_label(mut args: Vec<Arg>) -> (Vec<Arg>, Option<String>) {
    if args.len() <= 1 {
        return (args, None);
    }
    match args.last() {
        Some(Arg::Str(_)) => match args.pop() {
            Some(Arg::Str(label)) => (args, Some(label)),
            _ => (args, None),
        },
        _ => (args, None),
    }
}

/// Like [`split_label`], then also take a trailing stack off the messages.
fn split_label_and_stack(mut args: Vec<Arg>) -> (Vec<Arg>, Option<String>, Option<String>) {
    if args.len() == 2 {
        if is_stack_format(&args[1]) {
            let stack = args.pop().and_then(|arg| arg.as_str().map(str::to_string));
            return (args, None, stack);
        }
        if let Some(Arg::Str(_)) = args.last() {
            let label = args.pop().and_then(|arg| arg.as_str().map(str::to_string));
            return (args, label, None);
        }
    }

    let (mut messages, label) = split_label(args);
    if messages.len() <= 1 {
        return (messages, label, None);
    }
    match messages.last() {
        Some(Arg::Str(_)) | Some(Arg::Undefined) => {
            let stack = messages
                .pop()
                .and_then(|arg| arg.as_str().map(str::to_string));
            (messages, label, stack)
        }
        _ => (messages, label, None),
    }
}

/// A logger facade shaped like the framework's conventional logger:
/// `log(message, [...params, label])`.
///
/// Every message argument becomes its own record. A trailing string is the
/// label; for [`NativeLogger::error`] a trailing stack trace is recognized
/// and written as `stack` instead.
///
/// ```
/// use tracing_actix_web_context::{Arg, NativeLogger, Params};
///
/// let logger = NativeLogger::new(&Params::default());
/// logger.log("listening", &[Arg::from("Bootstrap")]);
/// logger.warn("first", &["second".into(), "Bootstrap".into()]);
/// ```
#[derive(Clone, Debug)]
pub struct NativeLogger {
    logger: StructuredLogger,
}

impl NativeLogger {
    /// Create a facade, initializing the fallback logger on first use.
    pub fn new(params: &Params) -> Self {
        Self::from_structured(StructuredLogger::new(params))
    }

    /// Wrap an existing structured facade. Its label is used for calls that
    /// do not pass one.
    pub fn from_structured(logger: StructuredLogger) -> Self {
        Self { logger }
    }

    /// The wrapped structured facade.
    pub fn structured(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Log at trace level.
    pub fn verbose(&self, message: impl Into<Arg>, optional_params: &[Arg]) {
        self.call(Level::Trace, message.into(), optional_params)
    }

    /// Log at debug level.
    pub fn debug(&self, message: impl Into<Arg>, optional_params: &[Arg]) {
        self.call(Level::Debug, message.into(), optional_params)
    }

    /// Log at info level.
    pub fn log(&self, message: impl Into<Arg>, optional_params: &[Arg]) {
        self.call(Level::Info, message.into(), optional_params)
    }

    /// Log at warn level.
    pub fn warn(&self, message: impl Into<Arg>, optional_params: &[Arg]) {
        self.call(Level::Warn, message.into(), optional_params)
    }

    /// Log at error level. A trailing argument shaped like a stack trace is
    /// written as `stack`.
    pub fn error(&self, message: impl Into<Arg>, optional_params: &[Arg]) {
        let args = collect(message.into(), optional_params);
        let (messages, label, stack) = split_label_and_stack(args);
        for message in messages {
            self.log_single_message(Level::Error, message, label.as_deref(), stack.as_deref());
        }
    }

    /// Log at fatal level.
    pub fn fatal(&self, message: impl Into<Arg>, optional_params: &[Arg]) {
        self.call(Level::Fatal, message.into(), optional_params)
    }

    fn call(&self, level: Level, message: Arg, optional_params: &[Arg]) {
        let (messages, label) = split_label(collect(message, optional_params));
        for message in messages {
            self.log_single_message(level, message, label.as_deref(), None);
        }
    }

    fn log_single_message(
        &self,
        level: Level,
        message: Arg,
        label: Option<&str>,
        stack: Option<&str>,
    ) {
        let logger = match self.logger.logger() {
            Some(logger) if logger.is_level_enabled(level) => logger,
            _ => return,
        };

        let mut args = match message {
            Arg::Str(text) => LogArgs::message(text),
            Arg::Object(object) => LogArgs::message(Value::Object(object)),
            Arg::Error(error) => LogArgs::message(error.stack),
            Arg::Value(value) => LogArgs::message(value.to_string()),
            Arg::Undefined => LogArgs::message("undefined"),
        };
        if let Some(stack) = stack.filter(|s| !s.is_empty()) {
            args = args.with_field("stack", stack);
        }

        let label = label
            .filter(|l| !l.is_empty())
            .or_else(|| self.logger.label());
        let args = self.logger.bind_label(args, label);
        logger.write(level, args.into_record());
    }

    /// Route records of the `log` crate through this facade, with each
    /// record's target as its label.
    pub fn install(self) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(log::LevelFilter::Trace);
        Ok(())
    }
}

fn collect(message: Arg, optional_params: &[Arg]) -> Vec<Arg> {
    let mut args = Vec::with_capacity(optional_params.len() + 1);
    args.push(message);
    args.extend(optional_params.iter().cloned());
    args
}

fn level_from_log(level: log::Level) -> Level {
    match level {
        log::Level::Error => Level::Error,
        log::Level::Warn => Level::Warn,
        log::Level::Info => Level::Info,
        log::Level::Debug => Level::Debug,
        log::Level::Trace => Level::Trace,
    }
}

impl log::Log for NativeLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        self.logger
            .logger()
            .map(|logger| logger.is_level_enabled(level_from_log(metadata.level())))
            .unwrap_or(false)
    }

    fn log(&self, record: &log::Record<'_>) {
        self.log_single_message(
            level_from_log(record.level()),
            Arg::Str(record.args().to_string()),
            Some(record.target()),
            None,
        );
    }

    fn flush(&self) {}
}
