//! Normalization of the call shapes accepted by the loggers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The canonical form of a single log call: structured fields plus an
/// optional message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogRecord {
    /// Fields written alongside the message.
    pub fields: Map<String, Value>,
    /// The message, written under the logger's message key.
    pub message: Option<Value>,
}

/// A serialized error: its type, message and a textual stack.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorInfo {
    /// Short name of the error's type.
    #[serde(rename = "type")]
    pub kind: String,
    /// The error's `Display` output.
    pub message: String,
    /// The error and each of its sources, one per line.
    pub stack: String,
}

impl ErrorInfo {
    /// Describe `error`, named after its concrete type.
    pub fn new<E: std::error::Error>(error: &E) -> Self {
        Self::from_dyn(short_type_name(std::any::type_name::<E>()), error)
    }

    /// Describe a type-erased error under an explicit type name.
    pub fn from_dyn<S: Into<String>>(kind: S, error: &dyn std::error::Error) -> Self {
        let kind = kind.into();
        let message = error.to_string();
        let mut stack = format!("{}: {}", kind, message);
        let mut source = error.source();
        while let Some(cause) = source {
            stack.push_str("\n    caused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            kind,
            message,
            stack,
        }
    }
}

impl From<&actix_web::Error> for ErrorInfo {
    fn from(error: &actix_web::Error) -> Self {
        let response_error = error.as_response_error();
        let message = response_error.to_string();
        Self {
            kind: "Error".to_string(),
            stack: format!("Error: {}", message),
            message,
        }
    }
}

/// The last path segment of a type name, without generic arguments.
pub(crate) fn short_type_name(full: &str) -> String {
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
        .to_string()
}

/// The arguments of a log call, before normalization.
///
/// Most callers never name this type; the logging methods accept anything
/// convertible into it:
///
/// ```
/// use serde_json::json;
/// use tracing_actix_web_context::{ErrorInfo, LogArgs};
///
/// let _ = LogArgs::from("plain message");
/// let _ = LogArgs::from(json!({"user": 7}));
/// let _ = LogArgs::from((json!({"user": 7}), "with a message"));
/// let _ = LogArgs::message("user %s logged in %d times").arg("ana").arg(3);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogArgs {
    fields: Option<Map<String, Value>>,
    err: Option<ErrorInfo>,
    message: Option<Value>,
    args: Vec<Value>,
}

impl LogArgs {
    /// Start from structured fields.
    pub fn fields(fields: Map<String, Value>) -> Self {
        Self {
            fields: Some(fields),
            ..Self::default()
        }
    }

    /// Start from an error.
    pub fn error(error: ErrorInfo) -> Self {
        Self {
            err: Some(error),
            ..Self::default()
        }
    }

    /// Start from a message.
    pub fn message<M: Into<Value>>(message: M) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Set the message.
    pub fn with_message<M: Into<Value>>(mut self, message: M) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach an error, written under `err`.
    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.err = Some(error);
        self
    }

    /// Add a field.
    pub fn with_field<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.fields
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Add a trailing argument, interpolated into the message.
    pub fn arg<A: Into<Value>>(mut self, arg: A) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Mutable access to the structured fields, creating them if needed.
    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        self.fields.get_or_insert_with(Map::new)
    }

    /// The attached error, if any.
    pub fn err(&self) -> Option<&ErrorInfo> {
        self.err.as_ref()
    }

    /// Normalize into a [`LogRecord`].
    ///
    /// An error lands under `err` and, when no message was given, provides
    /// the message. Trailing arguments are interpolated into a string
    /// message; arguments without a matching placeholder are appended.
    pub fn into_record(self) -> LogRecord {
        let mut fields = self.fields.unwrap_or_default();

        let mut message = self.message;
        if let Some(err) = self.err {
            if message.is_none() {
                message = Some(Value::String(err.message.clone()));
            }
            if let Ok(value) = serde_json::to_value(err) {
                fields.insert("err".to_string(), value);
            }
        }

        if !self.args.is_empty() {
            message = Some(Value::String(match message {
                Some(Value::String(template)) => interpolate(&template, &self.args),
                Some(other) => interpolate(&format_object(&other), &self.args),
                None => interpolate("", &self.args),
            }));
        }

        LogRecord { fields, message }
    }
}

fn format_object(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_number(value: &Value, integer: bool) -> String {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        _ => None,
    };
    match number {
        Some(n) if integer => format!("{}", n.trunc() as i64),
        Some(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", n as i64),
        Some(n) => n.to_string(),
        None => "NaN".to_string(),
    }
}

/// printf-style substitution of `%s %d %i %f %j %o %O`, with `%%` as a
/// literal percent sign.
fn interpolate(template: &str, args: &[Value]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            output.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('%') => {
                chars.next();
                output.push('%');
            }
            Some(spec @ ('s' | 'd' | 'i' | 'f' | 'j' | 'o' | 'O')) => match args.next() {
                Some(arg) => {
                    chars.next();
                    let formatted = match spec {
                        's' => format_object(arg),
                        'd' | 'i' => format_number(arg, true),
                        'f' => format_number(arg, false),
                        _ => arg.to_string(),
                    };
                    output.push_str(&formatted);
                }
                None => output.push('%'),
            },
            _ => output.push('%'),
        }
    }

    for rest in args {
        if !output.is_empty() {
            output.push(' ');
        }
        output.push_str(&format_object(rest));
    }
    output
}

impl From<&str> for LogArgs {
    fn from(message: &str) -> Self {
        Self::message(message)
    }
}

impl From<String> for LogArgs {
    fn from(message: String) -> Self {
        Self::message(message)
    }
}

impl From<Map<String, Value>> for LogArgs {
    fn from(fields: Map<String, Value>) -> Self {
        Self::fields(fields)
    }
}

impl From<Value> for LogArgs {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self::fields(fields),
            other => Self::message(other),
        }
    }
}

impl From<ErrorInfo> for LogArgs {
    fn from(error: ErrorInfo) -> Self {
        Self::error(error)
    }
}

impl From<(Value, &str)> for LogArgs {
    fn from((value, message): (Value, &str)) -> Self {
        Self::from(value).with_message(message)
    }
}

impl From<(Value, String)> for LogArgs {
    fn from((value, message): (Value, String)) -> Self {
        Self::from(value).with_message(message)
    }
}

impl From<(Map<String, Value>, &str)> for LogArgs {
    fn from((fields, message): (Map<String, Value>, &str)) -> Self {
        Self::fields(fields).with_message(message)
    }
}

impl From<(Map<String, Value>, String)> for LogArgs {
    fn from((fields, message): (Map<String, Value>, String)) -> Self {
        Self::fields(fields).with_message(message)
    }
}

impl From<(ErrorInfo, &str)> for LogArgs {
    fn from((error, message): (ErrorInfo, &str)) -> Self {
        Self::error(error).with_message(message)
    }
}

impl From<(ErrorInfo, String)> for LogArgs {
    fn from((error, message): (ErrorInfo, String)) -> Self {
        Self::error(error).with_message(message)
    }
}
