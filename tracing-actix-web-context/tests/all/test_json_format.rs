use crate::utils::{log_test, LogWatcher};
use pretty_assertions::assert_eq;
use serde_json::json;
use tracing::{event, span, Level as TracingLevel};
use tracing_actix_web_context::{
    JsonLogMessage, Level, Logger, LoggerOptions, RECORD_FIELD, SEVERITY_FIELD,
};

#[test]
fn test_format() {
    let mut log_watcher: LogWatcher<JsonLogMessage> = log_test(Level::Info, "msg", || {
        event!(TracingLevel::INFO, "simple event without a parent span");
    });

    let events = log_watcher.events();

    assert_eq!(events.len(), 1, "There should be exactly one event");
    let event = &events[0];
    assert_eq!(event.level, 30);
    assert_eq!(
        event.field("msg"),
        Some(&json!("simple event without a parent span"))
    );
    assert_eq!(event.field("name"), Some(&json!("test-logger")));
    assert_eq!(event.field("message"), None, "message is renamed to msg");

    // The timestamp should be in milliseconds. 1 teramillisecond since the
    // epoch is sometime in 2001, and 4 is in 2096.
    let time = event.time.expect("Should have a time");
    let terams = time / i64::pow(10, 12);
    assert!(
        (1..=4).contains(&terams),
        "Should have a millisecond timestamp in this century"
    );
}

#[test]
fn test_log_level_to_numeric_level() {
    let mut log_watcher: LogWatcher = log_test(Level::Trace, "msg", || {
        event!(TracingLevel::ERROR, "error");
        event!(TracingLevel::WARN, "warn");
        event!(TracingLevel::INFO, "info");
        event!(TracingLevel::DEBUG, "debug");
        event!(TracingLevel::TRACE, "trace");
    });

    let levels: Vec<(u8, String)> = log_watcher
        .events()
        .iter()
        .map(|e| (e.level, e.field("msg").unwrap().as_str().unwrap().to_string()))
        .collect();
    assert_eq!(
        levels,
        vec![
            (50, "error".to_string()),
            (40, "warn".to_string()),
            (30, "info".to_string()),
            (20, "debug".to_string()),
            (10, "trace".to_string()),
        ]
    );
}

#[test]
fn test_threshold_filters_events() {
    let mut log_watcher: LogWatcher = log_test(Level::Warn, "msg", || {
        event!(TracingLevel::INFO, "dropped");
        event!(TracingLevel::WARN, "kept");
    });

    let events = log_watcher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].field("msg"), Some(&json!("kept")));
}

#[test]
fn test_span_fields_are_inherited() {
    let mut log_watcher: LogWatcher = log_test(Level::Info, "message", || {
        let outer = span!(TracingLevel::INFO, "outer", a = 1, b = 1);
        let _outer_guard = outer.enter();
        let inner = span!(TracingLevel::INFO, "inner", b = 2, c = 2);
        let _inner_guard = inner.enter();
        event!(TracingLevel::INFO, c = 3, "nested");
    });

    let events = log_watcher.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.field("message"), Some(&json!("nested")));
    assert_eq!(event.field("a"), Some(&json!(1)), "outer span fields are kept");
    assert_eq!(event.field("b"), Some(&json!(2)), "inner spans win");
    assert_eq!(event.field("c"), Some(&json!(3)), "the event wins");
}

#[test]
fn test_records_are_written_verbatim() {
    let mut log_watcher: LogWatcher = log_test(Level::Info, "msg", || {
        let span = span!(TracingLevel::INFO, "ignored", from_span = true);
        let _guard = span.enter();
        event!(
            TracingLevel::ERROR,
            scope.severity = 60u64,
            scope.record = r#"{"custom":"yes","msg":"fatal record"}"#,
            "fatal record"
        );
    });

    let events = log_watcher.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.level, 60, "the record's own severity is used");
    assert_eq!(event.field("custom"), Some(&json!("yes")));
    assert_eq!(event.field("msg"), Some(&json!("fatal record")));
    assert_eq!(event.field("from_span"), None, "records carry their own fields");
    assert_eq!(event.field(SEVERITY_FIELD), None);
    assert_eq!(event.field(RECORD_FIELD), None);
}

#[test]
fn test_engine_output() {
    let log_watcher: LogWatcher = LogWatcher::default();
    let options = LoggerOptions {
        name: Some("engine".to_string()),
        ..LoggerOptions::default()
    };
    let logger = Logger::with_destination(&options, log_watcher.destination());
    let child = logger.child(json!({"component": "db"}).as_object().cloned().unwrap());

    child.info((json!({"rows": 3}), "query done"));
    child.debug("below threshold");
    child.fatal("shutting down");

    let mut log_watcher = log_watcher;
    let events = log_watcher.events().clone();
    assert_eq!(events.len(), 2);

    assert_eq!(events[0].level, 30);
    assert_eq!(events[0].pid, Some(std::process::id()));
    assert!(events[0].hostname.is_some());
    assert_eq!(events[0].field("name"), Some(&json!("engine")));
    assert_eq!(events[0].field("component"), Some(&json!("db")));
    assert_eq!(events[0].field("rows"), Some(&json!(3)));
    assert_eq!(events[0].field("msg"), Some(&json!("query done")));

    assert_eq!(events[1].level, 60);
    assert_eq!(events[1].field("msg"), Some(&json!("shutting down")));
}

#[test]
fn test_engine_options() {
    let log_watcher: LogWatcher = LogWatcher::default();
    let options = LoggerOptions {
        base: None,
        timestamp: false,
        ..LoggerOptions::native()
    };
    let logger = Logger::with_destination(&options, log_watcher.destination());
    logger.warn(json!({"message": "kept without a message argument"}));
    logger.warn((json!({"message": "replaced"}), "the message argument wins"));

    let mut log_watcher = log_watcher;
    let events = log_watcher.events();
    assert_eq!(
        events[0],
        JsonLogMessage {
            level: 40,
            fields: maplit::hashmap! {
                "message".to_string() => json!("kept without a message argument"),
            },
            ..JsonLogMessage::default()
        }
    );
    assert_eq!(
        events[1].field("message"),
        Some(&json!("the message argument wins"))
    );
}

#[test]
fn test_runtime_level_change() {
    let log_watcher: LogWatcher = LogWatcher::default();
    let logger = Logger::with_destination(&LoggerOptions::default(), log_watcher.destination());
    let child = logger.child(Default::default());

    child.debug("dropped");
    logger.set_level(Level::Debug);
    child.debug("kept");
    logger.set_level(Level::Silent);
    child.fatal("dropped too");

    let mut log_watcher = log_watcher;
    let messages: Vec<_> = log_watcher
        .events()
        .iter()
        .map(|e| e.field("msg").cloned())
        .collect();
    assert_eq!(messages, vec![Some(json!("kept"))]);
}
