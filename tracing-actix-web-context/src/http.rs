//! Per-request HTTP loggers and completion records.

use std::{collections::HashMap, time::Duration};

use actix_web::{
    dev::{ServiceRequest, ServiceResponse},
    http::header::HeaderMap,
    web, HttpMessage,
};
use serde_json::{json, Map, Value};
use tracing_actix_web::RequestId;

use crate::{
    logger::{Level, Logger},
    params::LoggerOptions,
    record::{ErrorInfo, LogArgs},
};

fn headers_to_json(headers: &HeaderMap) -> Value {
    let mut json = Map::new();
    for name in headers.keys() {
        let mut values: Vec<Value> = headers
            .get_all(name)
            .map(|value| value.to_str().unwrap_or("<bad_utf8>").into())
            .collect();
        // Repeated headers, like `set-cookie`, keep every value.
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            Value::Array(values)
        };
        json.insert(name.as_str().to_string(), value);
    }
    Value::Object(json)
}

/// Builds the request logger of each request from the engine, and writes
/// its completion record.
#[derive(Clone, Debug)]
pub struct HttpLogger {
    logger: Logger,
    auto_logging: bool,
    success_message: String,
    error_message: String,
}

impl HttpLogger {
    /// Wrap `logger`, the engine, configured by `options`.
    pub fn new(logger: Logger, options: &LoggerOptions) -> Self {
        Self {
            logger,
            auto_logging: options.auto_logging,
            success_message: options.success_message.clone(),
            error_message: options.error_message.clone(),
        }
    }

    /// A child of the engine bound to `req`'s details, under `req`.
    pub fn request_logger(&self, req: &ServiceRequest) -> Logger {
        let mut details = Map::new();
        if let Some(request_id) = req.extensions().get::<RequestId>() {
            details.insert("id".to_string(), request_id.to_string().into());
        }
        details.insert("method".to_string(), req.method().as_str().into());
        details.insert("url".to_string(), req.uri().to_string().into());
        let query = web::Query::<HashMap<String, String>>::from_query(req.query_string())
            .map(|q| q.into_inner())
            .unwrap_or_default();
        details.insert("query".to_string(), json!(query));
        details.insert("headers".to_string(), headers_to_json(req.headers()));
        if let Some(peer) = req.peer_addr() {
            details.insert("remoteAddress".to_string(), peer.ip().to_string().into());
            details.insert("remotePort".to_string(), peer.port().into());
        }

        let mut bindings = Map::new();
        bindings.insert("req".to_string(), Value::Object(details));
        self.logger.child(bindings)
    }

    /// Write the completion record of a request through `logger`, unless
    /// automatic logging is disabled.
    pub fn log_completion<B>(
        &self,
        logger: &Logger,
        outcome: &Result<ServiceResponse<B>, actix_web::Error>,
        elapsed: Duration,
    ) {
        if !self.auto_logging {
            return;
        }

        let response_time = elapsed.as_millis() as u64;
        let (level, args) = match outcome {
            Ok(response) => {
                let status = response.status();
                let res = json!({
                    "statusCode": status.as_u16(),
                    "headers": headers_to_json(response.headers()),
                });
                let failure = match response.response().error() {
                    Some(error) => Some(ErrorInfo::from(error)),
                    None if status.is_server_error() => {
                        let message = format!("failed with status code {}", status.as_u16());
                        Some(ErrorInfo {
                            kind: "Error".to_string(),
                            stack: format!("Error: {}", message),
                            message,
                        })
                    }
                    None => None,
                };
                match failure {
                    Some(err) => (
                        Level::Error,
                        LogArgs::message(self.error_message.as_str())
                            .with_error(err)
                            .with_field("res", res)
                            .with_field("responseTime", response_time),
                    ),
                    None => (
                        Level::Info,
                        LogArgs::message(self.success_message.as_str())
                            .with_field("res", res)
                            .with_field("responseTime", response_time),
                    ),
                }
            }
            Err(error) => {
                let status = error.as_response_error().status_code();
                (
                    Level::Error,
                    LogArgs::message(self.error_message.as_str())
                        .with_error(ErrorInfo::from(error))
                        .with_field("res", json!({ "statusCode": status.as_u16() }))
                        .with_field("responseTime", response_time),
                )
            }
        };
        logger.log(level, args);
    }
}
