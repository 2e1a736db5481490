//! Configuration for the loggers and the middleware.

use std::fmt;

use actix_web::http::Method;
use gethostname::gethostname;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::logger::{Destination, Level, Logger};

/// Options for the logging engine and the request completion records.
///
/// Every field has a default, so partial configuration deserializes:
///
/// ```
/// use tracing_actix_web_context::{Level, LoggerOptions};
///
/// let options: LoggerOptions = serde_json::from_str(r#"{"level": "debug"}"#).unwrap();
/// assert_eq!(options.level, Level::Debug);
/// assert_eq!(options.message_key, "msg");
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggerOptions {
    /// Minimum level written.
    pub level: Level,
    /// Written as `name` on every line, when set.
    pub name: Option<String>,
    /// Key the message is written under.
    pub message_key: String,
    /// Fields written on every line. `None` disables them.
    #[serde(default = "default_base")]
    pub base: Option<Map<String, Value>>,
    /// Whether lines carry a `time` field.
    pub timestamp: bool,
    /// Whether the middleware writes a record when each request completes.
    pub auto_logging: bool,
    /// Message of the completion record of successful requests.
    pub success_message: String,
    /// Message of the completion record of failed requests.
    pub error_message: String,
}

fn pid_field() -> (String, Value) {
    ("pid".to_string(), std::process::id().into())
}

fn default_base() -> Option<Map<String, Value>> {
    let mut base = Map::new();
    let (key, pid) = pid_field();
    base.insert(key, pid);
    base.insert(
        "hostname".to_string(),
        gethostname().to_string_lossy().into_owned().into(),
    );
    Some(base)
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            level: Level::Info,
            name: None,
            message_key: "msg".to_string(),
            base: default_base(),
            timestamp: true,
            auto_logging: true,
            success_message: "request completed".to_string(),
            error_message: "request errored".to_string(),
        }
    }
}

impl LoggerOptions {
    /// Options shaped like the framework's own logger: the message is written
    /// under `message`, and only `pid` is added to every line.
    pub fn native() -> Self {
        let (key, pid) = pid_field();
        let mut base = Map::new();
        base.insert(key, pid);
        Self {
            message_key: "message".to_string(),
            base: Some(base),
            ..Self::default()
        }
    }

    /// Set the minimum level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

/// How the logging engine is obtained.
#[derive(Clone, Debug)]
pub enum EngineParams {
    /// Build an engine writing to standard output.
    Options(LoggerOptions),
    /// Build an engine writing to a destination.
    WithDestination(LoggerOptions, Destination),
    /// Use an engine that was built elsewhere.
    Existing(Logger),
}

impl EngineParams {
    /// Build, or hand out, the engine.
    pub fn build(&self) -> Logger {
        match self {
            EngineParams::Options(options) => Logger::new(options),
            EngineParams::WithDestination(options, destination) => {
                Logger::with_destination(options, destination.clone())
            }
            EngineParams::Existing(logger) => logger.clone(),
        }
    }

    /// The options, or defaults for an existing engine.
    pub fn options(&self) -> LoggerOptions {
        match self {
            EngineParams::Options(options) | EngineParams::WithDestination(options, _) => {
                options.clone()
            }
            EngineParams::Existing(logger) => LoggerOptions {
                level: logger.level(),
                message_key: logger.message_key().to_string(),
                ..LoggerOptions::default()
            },
        }
    }
}

impl Default for EngineParams {
    fn default() -> Self {
        EngineParams::Options(LoggerOptions::default())
    }
}

/// A route the middleware is applied to, or excluded from.
///
/// Paths use actix's resource pattern syntax, like `/users/{id}`.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteRule {
    /// Resource pattern.
    pub path: String,
    /// Method to match, or any method when `None`.
    pub method: Option<Method>,
    /// Whether the pattern also matches everything below it.
    pub prefix: bool,
}

impl RouteRule {
    /// Match `path` exactly, for any method.
    pub fn new<S: Into<String>>(path: S) -> Self {
        Self {
            path: path.into(),
            method: None,
            prefix: false,
        }
    }

    /// Match `path` and everything below it.
    pub fn scope<S: Into<String>>(path: S) -> Self {
        Self {
            prefix: true,
            ..Self::new(path)
        }
    }

    /// Only match `method`.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }
}

impl From<&str> for RouteRule {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Everything the middleware and the loggers are configured with.
///
/// ```
/// use tracing_actix_web_context::{LoggerOptions, Params, RouteRule};
/// use actix_web::http::Method;
///
/// let params = Params::new()
///     .with_options(LoggerOptions::default())
///     .exclude(vec![RouteRule::new("/health").with_method(Method::GET)])
///     .rename_context("component")
///     .assign_response(true);
/// assert_eq!(params.context_key(), "component");
/// ```
#[derive(Clone, Default)]
pub struct Params {
    /// Engine construction.
    pub engine: EngineParams,
    /// Routes the middleware applies to. Empty means all.
    pub for_routes: Vec<RouteRule>,
    /// Routes the middleware skips.
    pub exclude: Vec<RouteRule>,
    /// Take request loggers from the host instead of building an engine.
    pub use_existing: bool,
    /// Key the label is written under. `context` when unset.
    pub rename_context: Option<String>,
    /// Whether [`crate::assign`] also updates the response logger.
    pub assign_response: bool,
    /// Fields merged into every record written through the facades.
    pub global_context: Map<String, Value>,
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Params")
            .field("engine", &self.engine)
            .field("for_routes", &self.for_routes)
            .field("exclude", &self.exclude)
            .field("use_existing", &self.use_existing)
            .field("context_key", &self.context_key())
            .field("assign_response", &self.assign_response)
            .finish()
    }
}

impl Params {
    /// Default parameters: an engine writing JSON to standard output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the engine from `options`, writing to standard output.
    pub fn with_options(mut self, options: LoggerOptions) -> Self {
        self.engine = EngineParams::Options(options);
        self
    }

    /// Build the engine from `options`, writing to `destination`.
    pub fn with_destination(mut self, options: LoggerOptions, destination: Destination) -> Self {
        self.engine = EngineParams::WithDestination(options, destination);
        self
    }

    /// Use an engine that was built elsewhere.
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.engine = EngineParams::Existing(logger);
        self
    }

    /// Only apply the middleware to these routes.
    pub fn for_routes<R: Into<RouteRule>>(mut self, routes: Vec<R>) -> Self {
        self.for_routes = routes.into_iter().map(Into::into).collect();
        self
    }

    /// Never apply the middleware to these routes.
    pub fn exclude<R: Into<RouteRule>>(mut self, routes: Vec<R>) -> Self {
        self.exclude = routes.into_iter().map(Into::into).collect();
        self
    }

    /// Take request loggers from the host, through an
    /// [`crate::ExistingLogger`] request extension. No engine is built.
    pub fn use_existing(mut self) -> Self {
        self.use_existing = true;
        self
    }

    /// Write labels under `key` instead of `context`.
    pub fn rename_context<S: Into<String>>(mut self, key: S) -> Self {
        self.rename_context = Some(key.into());
        self
    }

    /// Make [`crate::assign`] update the response logger too.
    pub fn assign_response(mut self, assign_response: bool) -> Self {
        self.assign_response = assign_response;
        self
    }

    /// Merge `fields` into every record written through the facades.
    pub fn global_context(mut self, fields: Map<String, Value>) -> Self {
        self.global_context = fields;
        self
    }

    /// The key labels are written under.
    pub fn context_key(&self) -> &str {
        self.rename_context.as_deref().unwrap_or("context")
    }
}
