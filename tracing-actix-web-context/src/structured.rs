use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    error::Error,
    fallback,
    logger::{Level, Logger},
    params::Params,
    record::LogArgs,
    storage,
};

/// The logger that is active right now: the current request's logger, or
/// the process-wide fallback outside of a request.
///
/// Returns `None` only outside of a request when the middleware takes its
/// loggers from the host, since no fallback exists then.
pub fn current_logger() -> Option<Logger> {
    match storage::current() {
        Some(store) => Some(store.logger()),
        None => fallback::out_of_context(),
    }
}

/// A logger facade with the engine's own call shapes.
///
/// Each call is written through [`current_logger`], so code deep inside a
/// request handler logs with the request's fields without being handed a
/// logger. A facade may carry a label, written under the context key
/// (`context` by default) with every record.
///
/// ```
/// use serde_json::json;
/// use tracing_actix_web_context::{Params, StructuredLogger};
///
/// let logger = StructuredLogger::new(&Params::default()).with_label("Billing");
/// logger.info("charging");
/// logger.info((json!({"amount": 12}), "charged"));
/// ```
#[derive(Clone, Debug)]
pub struct StructuredLogger {
    label: Option<String>,
    context_key: Arc<str>,
    global_context: Arc<Map<String, Value>>,
}

impl StructuredLogger {
    /// Create an unlabelled facade, initializing the fallback logger on
    /// first use.
    pub fn new(params: &Params) -> Self {
        if !params.use_existing {
            fallback::get_or_init(&params.engine);
        }
        Self {
            label: None,
            context_key: Arc::from(params.context_key()),
            global_context: Arc::new(params.global_context.clone()),
        }
    }

    /// Set the label. An empty label removes it.
    pub fn set_label<S: Into<String>>(&mut self, label: S) {
        let label = label.into();
        self.label = if label.is_empty() { None } else { Some(label) };
    }

    /// A copy of this facade with `label` set.
    pub fn with_label<S: Into<String>>(mut self, label: S) -> Self {
        self.set_label(label);
        self
    }

    /// The label, if set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The key labels are written under.
    pub fn context_key(&self) -> &str {
        &self.context_key
    }

    /// The engine exposed by the middleware, for runtime changes like
    /// adjusting the level. `None` until a middleware built its own engine.
    pub fn root() -> Option<Logger> {
        fallback::root()
    }

    /// The logger calls would be written through right now.
    pub fn logger(&self) -> Option<Logger> {
        current_logger()
    }

    /// Merge the label and global context into `args`.
    ///
    /// The label overrides a caller field of the same name; the global
    /// context overrides both.
    pub fn bind(&self, args: LogArgs) -> LogArgs {
        self.bind_label(args, self.label.as_deref())
    }

    pub(crate) fn bind_label(&self, mut args: LogArgs, label: Option<&str>) -> LogArgs {
        if label.is_none() && self.global_context.is_empty() {
            return args;
        }
        let fields = args.fields_mut();
        if let Some(label) = label {
            fields.insert(self.context_key.to_string(), label.into());
        }
        for (key, value) in self.global_context.iter() {
            fields.insert(key.clone(), value.clone());
        }
        args
    }

    /// Log at `level` through the active logger.
    pub fn log(&self, level: Level, args: impl Into<LogArgs>) {
        if let Some(logger) = self.logger() {
            if logger.is_level_enabled(level) {
                logger.write(level, self.bind(args.into()).into_record());
            }
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

    /// Same as [`crate::assign`].
    pub fn assign<T: Serialize>(&self, fields: T) -> Result<(), Error> {
        crate::assign(fields)
    }
}
