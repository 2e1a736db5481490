use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::HashMap, io::Write};
use tracing::{Event, Subscriber};
use tracing_bunyan_formatter::JsonStorage;
use tracing_subscriber::{fmt::MakeWriter, layer::Context};

use crate::logger::{Level, LevelHandle};

/// Event field carrying the numeric severity of a [`crate::Logger`] record.
pub const SEVERITY_FIELD: &str = "scope.severity";

/// Event field carrying the serialized fields of a [`crate::Logger`] record.
pub const RECORD_FIELD: &str = "scope.record";

/// This layer renders events as single-line JSON objects with numeric
/// levels. It relies on the upstream [`crate::JsonStorageLayer`] to get
/// access to the fields attached to each span.
///
/// Records written through a [`crate::Logger`] are emitted exactly as the
/// logger built them. Any other event is rendered from its own fields plus
/// the fields of its enclosing spans, so plain `tracing` macros used inside a
/// request still carry the request span's data.
///
/// # Example
///
/// ```
/// use tracing_actix_web_context::{JsonLogLayer, JsonStorageLayer, Level, LevelHandle};
/// use tracing_subscriber::layer::SubscriberExt;
/// let subscriber = tracing_subscriber::registry()
///     .with(JsonStorageLayer)
///     .with(JsonLogLayer::new(std::io::stdout, LevelHandle::new(Level::Info)));
/// ```
pub struct JsonLogLayer<W> {
    name: Option<String>,
    base: Map<String, Value>,
    message_key: String,
    timestamp: bool,
    level: LevelHandle,
    make_writer: W,
}

/// A rendered log line, as written by [`JsonLogLayer`].
#[derive(Clone, Default, Debug, PartialEq, Deserialize, Serialize)]
pub struct JsonLogMessage {
    /// Numeric severity: trace 10 up to fatal 60
    pub level: u8,

    /// Milliseconds since the UNIX epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,

    /// Process ID that generated the message, when part of the base fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Hostname that generated the message, when part of the base fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Everything else
    #[serde(flatten)]
    pub fields: HashMap<String, Value>,
}

impl JsonLogMessage {
    /// A field of the record, if set.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The value at a `/`-separated path, like `req/method`.
    pub fn pointer(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('/');
        let first = self.fields.get(parts.next()?)?;
        parts.try_fold(first, |value, key| value.get(key))
    }
}

impl<W> JsonLogLayer<W>
where
    W: for<'a> MakeWriter<'a> + 'static,
{
    /// Create a layer writing to `make_writer`, filtering on `level`.
    pub fn new(make_writer: W, level: LevelHandle) -> Self {
        Self {
            name: None,
            base: Map::new(),
            message_key: "msg".to_string(),
            timestamp: true,
            level,
            make_writer,
        }
    }

    /// Set the `name` written to every line.
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// Set the fields written to every line, like `pid` and `hostname`.
    pub fn with_base(mut self, base: Map<String, Value>) -> Self {
        self.base = base;
        self
    }

    /// Set the key that the message of a plain `tracing` event is written
    /// under.
    pub fn with_message_key<S: AsRef<str>>(mut self, message_key: S) -> Self {
        self.message_key = message_key.as_ref().to_string();
        self
    }

    /// Whether lines carry a `time` field.
    pub fn with_timestamp(mut self, timestamp: bool) -> Self {
        self.timestamp = timestamp;
        self
    }

    fn emit(&self, mut buffer: Vec<u8>) -> Result<(), std::io::Error> {
        buffer.write_all(b"\n")?;
        self.make_writer.make_writer().write_all(&buffer)
    }

    fn render(&self, severity: u8, fields: Map<String, Value>) -> Map<String, Value> {
        let mut line = Map::new();
        line.insert("level".to_string(), severity.into());
        if self.timestamp {
            line.insert(
                "time".to_string(),
                chrono::Utc::now().timestamp_millis().into(),
            );
        }
        line.extend(self.base.clone());
        if let Some(name) = &self.name {
            line.insert("name".to_string(), name.clone().into());
        }
        for (key, value) in fields {
            if key != "level" && key != "time" {
                line.insert(key, value);
            }
        }
        line
    }
}

impl<S, W> tracing_subscriber::Layer<S> for JsonLogLayer<W>
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    W: for<'a> MakeWriter<'a> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut event_visitor = JsonStorage::default();
        event.record(&mut event_visitor);
        let mut values: HashMap<&str, Value> = event_visitor
            .values()
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect();

        let severity = values
            .remove(SEVERITY_FIELD)
            .and_then(|v| match v {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            })
            .map(|n| n.min(u64::from(u8::MAX)) as u8)
            .unwrap_or_else(|| Level::from_tracing(event.metadata().level()).as_u8());

        if !self.level.enabled(severity) {
            return;
        }

        let record = values
            .remove(RECORD_FIELD)
            .and_then(|v| v.as_str().map(serde_json::from_str::<Map<String, Value>>))
            .and_then(Result::ok);

        let fields = match record {
            Some(fields) => fields,
            None => {
                let mut fields: Map<String, Value> = values
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect();

                let mut current = ctx.lookup_current();
                while let Some(span) = &current {
                    {
                        let ext = span.extensions();
                        if let Some(span_visitor) = ext.get::<JsonStorage>() {
                            for (k, v) in span_visitor.values() {
                                fields.entry(k.to_string()).or_insert_with(|| v.clone());
                            }
                        }
                    }
                    current = span.parent();
                }

                if self.message_key != "message" {
                    if let Some(message) = fields.remove("message") {
                        fields.insert(self.message_key.clone(), message);
                    }
                }
                fields
            }
        };

        let line = self.render(severity, fields);

        // If there is an error, just squash it quietly. After all, if we
        // failed to log, we can't exactly log an error.
        if let Ok(bytes) = serde_json::to_vec(&line) {
            self.emit(bytes).ok();
        }
    }
}
