//! # tracing-actix-web-context
//!
//! Request-scoped structured logging for [actix-web](https://actix.rs/) apps,
//! built on [tracing].
//!
//! Every request handled by the [`RequestLogging`] middleware gets its own
//! logger, bound to the request's details. Code anywhere below the handler
//! logs through that logger with a [`StructuredLogger`] or a
//! [`NativeLogger`], without a logger being passed down the call chain.
//! Outside of a request the same facades fall back to a process-wide
//! logger.
//!
//! ## Output
//!
//! Records are written as one JSON object per line, with a numeric level:
//!
//! ```text
//! {"level":30,"time":1700000000000,"pid":42,"hostname":"web-1","req":{"id":"…","method":"GET","url":"/"},"context":"Orders","msg":"order placed"}
//! ```
//!
//! The engine is a `tracing` subscriber: a [`tracing_subscriber::Registry`]
//! with a [`JsonStorageLayer`] and a [`JsonLogLayer`]. It can also be used on
//! its own:
//!
//! ```rust
//! use tracing_actix_web_context::{JsonLogLayer, JsonStorageLayer, Level, LevelHandle};
//! use tracing_subscriber::layer::SubscriberExt;
//!
//! let subscriber = tracing_subscriber::registry()
//!     .with(JsonStorageLayer)
//!     .with(JsonLogLayer::new(std::io::stdout, LevelHandle::new(Level::Info)));
//! ```
//!
//! ## Middleware
//!
//! To make sure that every worker shares one engine, create the middleware
//! outside of the `HttpServer::new` closure:
//!
//! ```rust
//! use tracing_actix_web_context::{Params, RequestLogging};
//! use actix_web::{HttpServer, App};
//!
//! let request_logging = RequestLogging::new(&Params::default());
//!
//! let server = HttpServer::new(move || {
//!     App::new()
//!         .wrap(request_logging.clone())
//! });
//! ```
//!
//! A record is written when each request completes, with the response's
//! status code and the time it took. Routes can be included or excluded
//! with [`Params::for_routes`] and [`Params::exclude`].
//!
//! ## Logging from anywhere
//!
//! ```rust
//! use serde_json::json;
//! use tracing_actix_web_context::{ErrorInfo, LogArgs, Params, StructuredLogger};
//!
//! fn charge(logger: &StructuredLogger, amount: u32) {
//!     logger.info((json!({ "amount": amount }), "charging"));
//!     logger.debug(LogArgs::message("charged %d cents").arg(amount));
//! }
//!
//! let logger = StructuredLogger::new(&Params::default()).with_label("Billing");
//! charge(&logger, 1200);
//! ```
//!
//! Labelled loggers can be declared up front with [`inject_logger`] and
//! built by a [`LoggerModule`]. Fields can be added to the current request's
//! logger with [`assign`].
//!
//! ## Spawned tasks
//!
//! Tasks spawned from a request do not inherit its logger. Wrap their
//! futures with [`storage::propagate`] first.

#![warn(missing_docs)]

mod assign;
mod error;
mod extractors;
pub mod fallback;
mod http;
mod logger;
mod middleware;
mod module;
mod native;
mod params;
mod record;
mod registry;
pub mod storage;
mod structured;
mod subscriber;

pub use crate::assign::assign;
pub use crate::error::Error;
pub use crate::http::HttpLogger;
pub use crate::logger::{Destination, Level, LevelHandle, Logger};
pub use crate::middleware::{ExistingLogger, RequestLogging, ScopeRootSpanBuilder};
pub use crate::module::LoggerModule;
pub use crate::native::{Arg, NativeLogger};
pub use crate::params::{EngineParams, LoggerOptions, Params, RouteRule};
pub use crate::record::{ErrorInfo, LogArgs, LogRecord};
pub use crate::registry::{
    inject_logger, logger_token, registered_labels, LoggerProviders, LoggerToken,
};
pub use crate::structured::{current_logger, StructuredLogger};
pub use crate::subscriber::{JsonLogLayer, JsonLogMessage, RECORD_FIELD, SEVERITY_FIELD};
pub use tracing_bunyan_formatter::JsonStorageLayer;
