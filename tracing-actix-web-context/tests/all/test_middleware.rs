use actix_web::{
    dev::Service, get, http::StatusCode, test, web, App, HttpMessage, HttpRequest, HttpResponse,
    ResponseError,
};
use futures_util::future::join;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::{fmt::Display, time::Duration};

use crate::utils::{serial, watched_params, LogWatcher};
use tracing_actix_web_context::{
    storage, ExistingLogger, JsonLogMessage, Level, Logger, LoggerModule, LoggerOptions,
    NativeLogger, RequestLogging, RouteRule, StructuredLogger,
};

#[get("/{status}")]
async fn handler_status_echo(status: web::Path<u16>) -> HttpResponse {
    HttpResponse::new(StatusCode::from_u16(*status).expect("invalid status code"))
}

#[derive(Debug)]
struct TestError;

impl Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "test error")
    }
}

impl ResponseError for TestError {}

#[get("/error")]
async fn handler_error() -> Result<HttpResponse, TestError> {
    Err(TestError)
}

async fn handler_logs(logger: StructuredLogger) -> HttpResponse {
    logger.info("from the handler");
    deep_in_the_call_chain().await;
    HttpResponse::Ok().finish()
}

async fn deep_in_the_call_chain() {
    tokio::task::yield_now().await;
    StructuredLogger::new(&Default::default())
        .with_label("Deep")
        .warn("from deep inside");
}

fn message_is(message: &'static str) -> impl Fn(&JsonLogMessage) -> bool {
    move |e| e.field("msg") == Some(&json!(message))
}

#[actix_rt::test]
async fn test_handler_records_carry_request_details() {
    let _guard = serial();
    let (mut log_watcher, params) = watched_params(LoggerOptions::default());

    let app = test::init_service(
        App::new()
            .wrap(RequestLogging::new(&params))
            .route("/logs", web::get().to(handler_logs)),
    )
    .await;
    let req = test::TestRequest::with_uri("/logs?page=2")
        .append_header(("User-Agent", "A Test Client"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let event = log_watcher.find_one(message_is("from the handler"));
    assert_eq!(event.level, 30);
    assert_eq!(event.pointer("req/method"), Some(&json!("GET")));
    assert_eq!(event.pointer("req/url"), Some(&json!("/logs?page=2")));
    assert_eq!(event.pointer("req/query"), Some(&json!({"page": "2"})));
    assert_eq!(
        event.pointer("req/headers/user-agent"),
        Some(&json!("A Test Client"))
    );
    assert!(event.pointer("req/id").is_some(), "should have a request id");
    assert_eq!(event.field("context"), None);

    let deep = log_watcher.find_one(message_is("from deep inside"));
    assert_eq!(deep.field("context"), Some(&json!("Deep")));
    assert_eq!(deep.pointer("req/id"), event.pointer("req/id"));
}

#[actix_rt::test]
async fn test_completion_records() {
    let _guard = serial();
    let (mut log_watcher, params) = watched_params(LoggerOptions::default());

    let app = test::init_service(
        App::new()
            .wrap(RequestLogging::new(&params))
            .service(handler_error)
            .service(handler_status_echo),
    )
    .await;

    for (uri, status) in [
        ("/200", StatusCode::OK),
        ("/400", StatusCode::BAD_REQUEST),
        ("/503", StatusCode::SERVICE_UNAVAILABLE),
        ("/error", StatusCode::INTERNAL_SERVER_ERROR),
    ] {
        let req = test::TestRequest::with_uri(uri).to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), status);
    }

    let completed = log_watcher.find(|e| e.field("responseTime").is_some()).len();
    assert_eq!(completed, 4, "one completion record per request");

    let ok = log_watcher.find_one(|e| e.pointer("res/statusCode") == Some(&json!(200)));
    assert_eq!(ok.level, 30);
    assert_eq!(ok.field("msg"), Some(&json!("request completed")));
    assert_eq!(ok.pointer("req/url"), Some(&json!("/200")));

    let client_error = log_watcher.find_one(|e| e.pointer("res/statusCode") == Some(&json!(400)));
    assert_eq!(client_error.level, 30, "client errors are not failures");

    let unavailable = log_watcher.find_one(|e| e.pointer("res/statusCode") == Some(&json!(503)));
    assert_eq!(unavailable.level, 50);
    assert_eq!(unavailable.field("msg"), Some(&json!("request errored")));
    assert_eq!(
        unavailable.pointer("err/message"),
        Some(&json!("failed with status code 503"))
    );

    let errored = log_watcher.find_one(|e| e.pointer("res/statusCode") == Some(&json!(500)));
    assert_eq!(errored.level, 50);
    assert_eq!(errored.pointer("err/message"), Some(&json!("test error")));
}

#[actix_rt::test]
async fn test_custom_completion_message() {
    let _guard = serial();
    let options = LoggerOptions {
        success_message: "done".to_string(),
        ..LoggerOptions::default()
    };
    let (mut log_watcher, params) = watched_params(options);

    let app = test::init_service(
        App::new()
            .wrap(RequestLogging::new(&params))
            .service(handler_status_echo),
    )
    .await;
    test::call_service(&app, test::TestRequest::with_uri("/204").to_request()).await;

    let event = log_watcher.find_one(message_is("done"));
    assert_eq!(event.pointer("res/statusCode"), Some(&json!(204)));
}

#[actix_rt::test]
async fn test_auto_logging_disabled() {
    let _guard = serial();
    let options = LoggerOptions {
        auto_logging: false,
        ..LoggerOptions::default()
    };
    let (mut log_watcher, params) = watched_params(options);

    let app = test::init_service(
        App::new()
            .wrap(RequestLogging::new(&params))
            .service(handler_status_echo),
    )
    .await;
    test::call_service(&app, test::TestRequest::with_uri("/204").to_request()).await;

    assert!(log_watcher.events().is_empty(), "auto logging is disabled");
}

#[actix_rt::test]
async fn test_excluded_routes_are_not_scoped() {
    let _guard = serial();
    let (mut log_watcher, params) = watched_params(LoggerOptions::default());
    let params = params.exclude(vec![RouteRule::new("/exclude")]);

    let app = test::init_service(
        App::new()
            .wrap(RequestLogging::new(&params))
            .route("/exclude", web::get().to(handler_logs))
            .route("/include", web::get().to(handler_logs)),
    )
    .await;
    test::call_service(&app, test::TestRequest::with_uri("/exclude").to_request()).await;

    let events = log_watcher.events().clone();
    assert_eq!(events.len(), 2, "only the handler's records, no completion");
    assert!(events.iter().all(|e| e.field("req").is_none()));
    assert!(events.iter().all(|e| e.field("responseTime").is_none()));

    test::call_service(&app, test::TestRequest::with_uri("/include").to_request()).await;
    let event = log_watcher.find_one(|e| e.pointer("req/url") == Some(&json!("/include")));
    assert_eq!(event.field("msg"), Some(&json!("from the handler")));
}

#[actix_rt::test]
async fn test_for_routes_and_methods() {
    let _guard = serial();
    let (mut log_watcher, params) = watched_params(LoggerOptions::default());
    let params = params
        .for_routes(vec![RouteRule::scope("/api")])
        .exclude(vec![
            RouteRule::new("/api/health").with_method(actix_web::http::Method::GET)
        ]);

    let app = test::init_service(
        App::new()
            .wrap(RequestLogging::new(&params))
            .route("/api/users", web::get().to(handler_logs))
            .route("/api/health", web::get().to(handler_logs))
            .route("/api/health", web::post().to(handler_logs))
            .route("/other", web::get().to(handler_logs)),
    )
    .await;

    for req in [
        test::TestRequest::with_uri("/api/users").to_request(),
        test::TestRequest::with_uri("/api/health").to_request(),
        test::TestRequest::post().uri("/api/health").to_request(),
        test::TestRequest::with_uri("/other").to_request(),
    ] {
        test::call_service(&app, req).await;
    }

    let scoped: Vec<(String, String)> = log_watcher
        .find(|e| e.field("responseTime").is_some())
        .iter()
        .map(|e| {
            (
                e.pointer("req/method").unwrap().as_str().unwrap().to_string(),
                e.pointer("req/url").unwrap().as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        scoped,
        vec![
            ("GET".to_string(), "/api/users".to_string()),
            ("POST".to_string(), "/api/health".to_string()),
        ]
    );
}

async fn handler_slow(req: HttpRequest, logger: StructuredLogger) -> HttpResponse {
    let who = req.match_info().get("who").unwrap_or_default().to_string();
    logger.info((json!({ "who": who }), "before sleep"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    logger.info((json!({ "who": who }), "after sleep"));
    HttpResponse::Ok().finish()
}

#[actix_rt::test]
async fn test_concurrent_requests_are_isolated() {
    let _guard = serial();
    let (mut log_watcher, params) = watched_params(LoggerOptions::default());

    let app = test::init_service(
        App::new()
            .wrap(RequestLogging::new(&params))
            .route("/slow/{who}", web::get().to(handler_slow)),
    )
    .await;

    let (a, b) = join(
        test::call_service(&app, test::TestRequest::with_uri("/slow/a").to_request()),
        test::call_service(&app, test::TestRequest::with_uri("/slow/b").to_request()),
    )
    .await;
    assert_eq!(a.status(), StatusCode::OK);
    assert_eq!(b.status(), StatusCode::OK);

    let handler_events = log_watcher.find(|e| e.field("who").is_some());
    assert_eq!(handler_events.len(), 4);
    for event in handler_events {
        let who = event.field("who").unwrap().as_str().unwrap();
        assert_eq!(
            event.pointer("req/url"),
            Some(&json!(format!("/slow/{}", who))),
            "records are written with their own request's logger"
        );
    }
}

#[actix_rt::test]
async fn test_spawned_tasks_keep_the_request_logger() {
    let _guard = serial();
    let (mut log_watcher, params) = watched_params(LoggerOptions::default());

    let app = test::init_service(App::new().wrap(RequestLogging::new(&params)).route(
        "/spawn",
        web::get().to(|logger: StructuredLogger| async move {
            actix_rt::spawn(storage::propagate(async move {
                logger.info("from a spawned task");
            }))
            .await
            .ok();
            HttpResponse::Ok().finish()
        }),
    ))
    .await;
    test::call_service(&app, test::TestRequest::with_uri("/spawn").to_request()).await;

    let event = log_watcher.find_one(message_is("from a spawned task"));
    assert_eq!(event.pointer("req/url"), Some(&json!("/spawn")));
}

#[actix_rt::test]
async fn test_plain_tracing_events_carry_the_request_span() {
    let _guard = serial();
    let (mut log_watcher, params) = watched_params(LoggerOptions::default());

    let app = test::init_service(App::new().wrap(RequestLogging::new(&params)).route(
        "/plain",
        web::get().to(|| async {
            tracing::info!(items = 3, "plain event");
            HttpResponse::Ok().finish()
        }),
    ))
    .await;
    test::call_service(&app, test::TestRequest::with_uri("/plain").to_request()).await;

    let event = log_watcher.find_one(message_is("plain event"));
    assert_eq!(event.level, 30);
    assert_eq!(event.field("items"), Some(&json!(3)));
    assert_eq!(event.field("method"), Some(&json!("GET")));
    assert_eq!(event.field("path"), Some(&json!("/plain")));
    assert!(event.field("request_id").is_some());
}

#[actix_rt::test]
async fn test_root_adjusts_level_at_runtime() {
    let _guard = serial();
    let (mut log_watcher, params) = watched_params(LoggerOptions::default());

    let middleware = RequestLogging::new(&params);
    let root = StructuredLogger::root().expect("the middleware exposes its engine");
    root.set_level(Level::Warn);

    let app = test::init_service(
        App::new()
            .wrap(middleware)
            .route("/logs", web::get().to(handler_logs)),
    )
    .await;
    test::call_service(&app, test::TestRequest::with_uri("/logs").to_request()).await;

    let messages: Vec<_> = log_watcher
        .events()
        .iter()
        .map(|e| e.field("msg").cloned())
        .collect();
    assert_eq!(messages, vec![Some(json!("from deep inside"))]);
}

#[actix_rt::test]
async fn test_native_logger_in_request() {
    let _guard = serial();
    let (mut log_watcher, params) = watched_params(LoggerOptions::default());

    let app = test::init_service(App::new().wrap(RequestLogging::new(&params)).route(
        "/native",
        web::get().to(|logger: NativeLogger| async move {
            logger.log("native", &["Controller".into()]);
            HttpResponse::Ok().finish()
        }),
    ))
    .await;
    test::call_service(&app, test::TestRequest::with_uri("/native").to_request()).await;

    let event = log_watcher.find_one(message_is("native"));
    assert_eq!(event.field("context"), Some(&json!("Controller")));
    assert_eq!(event.pointer("req/url"), Some(&json!("/native")));
}

async fn handler_existing(logger: StructuredLogger) -> HttpResponse {
    logger.info("from the handler");
    HttpResponse::Ok().finish()
}

#[actix_rt::test]
async fn test_existing_loggers_from_the_host() {
    let _guard = serial();
    let host_watcher: LogWatcher = LogWatcher::default();
    let host = Logger::with_destination(&LoggerOptions::default(), host_watcher.destination())
        .child(json!({"host": true}).as_object().cloned().unwrap());
    let (mut unused_watcher, params) = watched_params(LoggerOptions::default());

    let module = LoggerModule::for_root(params.use_existing());
    assert!(StructuredLogger::root().is_none(), "no root in existing mode");

    let app = test::init_service(
        App::new()
            .wrap(module.middleware())
            .wrap_fn(move |req, srv| {
                if req.path() != "/unscoped" {
                    req.extensions_mut()
                        .insert(ExistingLogger::new(host.clone()));
                }
                srv.call(req)
            })
            .configure(|cfg| module.configure(cfg))
            .route("/scoped", web::get().to(handler_existing))
            .route("/unscoped", web::get().to(handler_existing)),
    )
    .await;
    test::call_service(&app, test::TestRequest::with_uri("/scoped").to_request()).await;
    test::call_service(&app, test::TestRequest::with_uri("/unscoped").to_request()).await;

    let mut host_watcher = host_watcher;
    let events = host_watcher.events().clone();
    assert_eq!(events.len(), 1, "the scoped handler record only, no completion");
    assert_eq!(events[0].field("host"), Some(&json!(true)));
    assert_eq!(events[0].field("req"), None);
    assert!(
        unused_watcher.events().is_empty(),
        "no engine is built from the params"
    );
}
