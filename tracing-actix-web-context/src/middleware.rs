//! Installing a request-scoped logger for the request/response cycle.

use std::{
    fmt,
    future::Future,
    marker::PhantomData,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};

use actix_web::{
    body::MessageBody,
    dev::{ResourceDef, Service, ServiceRequest, ServiceResponse, Transform},
    http::Method,
    HttpMessage,
};
use tracing::{Dispatch, Span};
use tracing_actix_web::{RequestId, RootSpanBuilder, TracingLogger};
use tracing_futures::WithSubscriber;

use crate::{
    fallback,
    http::HttpLogger,
    logger::Logger,
    params::{Params, RouteRule},
    storage::{self, Store},
};

/// Loggers the host application provides for a request, when the
/// middleware is configured with [`Params::use_existing`].
///
/// Insert it into the request extensions from a middleware that runs before
/// [`RequestLogging`]. Requests without it are not scoped.
///
/// The response logger is only tracked with [`Params::assign_response`].
/// Fields added with [`crate::assign`] go to the request's [`Store`], which
/// stays readable as an `Arc<Store>` request extension once the response is
/// returned, so the host can write its own completion record with
/// [`Store::response_logger`].
///
/// ```
/// use actix_web::{dev::Service, App, HttpMessage};
/// use tracing_actix_web_context::{ExistingLogger, Logger, Params, RequestLogging};
///
/// let host_logger = Logger::from_dispatch(tracing::Dispatch::none());
/// let app = App::new()
///     .wrap(RequestLogging::new(&Params::new().use_existing()))
///     .wrap_fn(move |req, srv| {
///         req.extensions_mut().insert(ExistingLogger::new(host_logger.clone()));
///         srv.call(req)
///     });
/// ```
#[derive(Clone, Debug)]
pub struct ExistingLogger {
    /// The request logger.
    pub request: Logger,
    /// A separate response logger, if the host tracks one.
    pub response: Option<Logger>,
}

impl ExistingLogger {
    /// Provide only a request logger.
    pub fn new(request: Logger) -> Self {
        Self {
            request,
            response: None,
        }
    }

    /// Provide a response logger as well.
    pub fn with_response(mut self, response: Logger) -> Self {
        self.response = Some(response);
        self
    }
}

#[derive(Clone, Debug)]
struct RouteMatcher {
    pattern: ResourceDef,
    method: Option<Method>,
}

impl RouteMatcher {
    fn new(rule: &RouteRule) -> Self {
        let pattern = if rule.prefix {
            ResourceDef::prefix(rule.path.as_str())
        } else {
            ResourceDef::new(rule.path.as_str())
        };
        Self {
            pattern,
            method: rule.method.clone(),
        }
    }

    fn matches(&self, req: &ServiceRequest) -> bool {
        self.method.as_ref().map_or(true, |m| m == req.method())
            && self.pattern.is_match(req.path())
    }
}

#[derive(Clone, Debug, Default)]
struct RouteFilter {
    include: Vec<RouteMatcher>,
    exclude: Vec<RouteMatcher>,
}

impl RouteFilter {
    fn new(params: &Params) -> Self {
        Self {
            include: params.for_routes.iter().map(RouteMatcher::new).collect(),
            exclude: params.exclude.iter().map(RouteMatcher::new).collect(),
        }
    }

    fn applies(&self, req: &ServiceRequest) -> bool {
        (self.include.is_empty() || self.include.iter().any(|r| r.matches(req)))
            && !self.exclude.iter().any(|r| r.matches(req))
    }
}

#[derive(Clone, Debug)]
enum ScopeMode {
    /// Request loggers are children of an engine built from the params.
    Managed(HttpLogger),
    /// Request loggers come from an [`ExistingLogger`] extension.
    Existing,
}

#[derive(Debug)]
struct ScopeSettings {
    mode: ScopeMode,
    routes: RouteFilter,
    assign_response: bool,
}

/// Middleware factory that gives every matching request its own logger.
///
/// Anything reachable from the request's handler can log through it with a
/// [`crate::StructuredLogger`] or [`crate::NativeLogger`] without being
/// handed a logger. Unless disabled with `auto_logging`, a record is written
/// when each request completes.
///
/// The middleware also runs each request under its engine's `tracing`
/// dispatcher, inside a `request` span, so plain `tracing` events logged by
/// handlers carry the request's method, path and id.
///
/// Create it outside of the `HttpServer::new` closure, so every worker
/// shares one engine:
///
/// ```
/// use tracing_actix_web_context::{Params, RequestLogging};
/// use actix_web::{HttpServer, App};
///
/// let request_logging = RequestLogging::new(&Params::default());
///
/// let server = HttpServer::new(move || {
///     App::new()
///         .wrap(request_logging.clone())
/// });
/// ```
#[derive(Clone)]
pub struct RequestLogging {
    dispatch: Dispatch,
    tracing_logger: TracingLogger<ScopeRootSpanBuilder>,
    scope: Arc<ScopeSettings>,
}

impl RequestLogging {
    /// Build the middleware from `params`.
    ///
    /// Unless `use_existing` is set, this shares the process-wide engine
    /// with the facades (building it if needed) and exposes it through
    /// [`crate::StructuredLogger::root`].
    pub fn new(params: &Params) -> Self {
        let (dispatch, mode) = if params.use_existing {
            (
                tracing::dispatcher::get_default(Dispatch::clone),
                ScopeMode::Existing,
            )
        } else {
            let engine = fallback::get_or_init(&params.engine);
            fallback::set_root(&engine);
            let http = HttpLogger::new(engine.clone(), &params.engine.options());
            (engine.dispatch().clone(), ScopeMode::Managed(http))
        };

        Self {
            dispatch,
            tracing_logger: TracingLogger::new(),
            scope: Arc::new(ScopeSettings {
                mode,
                routes: RouteFilter::new(params),
                assign_response: params.assign_response,
            }),
        }
    }
}

impl fmt::Debug for RequestLogging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLogging")
            .field("dispatch", &self.dispatch)
            .field("scope", &self.scope)
            .finish()
    }
}

impl Default for RequestLogging {
    fn default() -> Self {
        Self::new(&Params::default())
    }
}

type TracingMiddleware<S> =
    <TracingLogger<ScopeRootSpanBuilder> as Transform<RequestScope<S>, ServiceRequest>>::Transform;

type ServiceFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>>>>;

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static + MessageBody,
    S: 'static,
{
    type Response = <TracingLogger<ScopeRootSpanBuilder> as Transform<
        RequestScope<S>,
        ServiceRequest,
    >>::Response;
    type Error = actix_web::Error;
    type Transform = RequestLoggingMiddleware<TracingMiddleware<S>>;
    type InitError = ();
    type Future = RequestLoggingTransform<S, B>;

    fn new_transform(&self, service: S) -> Self::Future {
        let scoped = RequestScope {
            service,
            scope: Arc::clone(&self.scope),
        };
        RequestLoggingTransform {
            inner: Box::pin(self.tracing_logger.new_transform(scoped)),
            dispatch: self.dispatch.clone(),
            _body: PhantomData,
        }
    }
}

#[doc(hidden)]
pub struct RequestLoggingTransform<S, B>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static + MessageBody,
{
    dispatch: Dispatch,
    inner: Pin<Box<dyn Future<Output = Result<TracingMiddleware<S>, ()>>>>,
    _body: PhantomData<fn() -> B>,
}

impl<S, B> Future for RequestLoggingTransform<S, B>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static + MessageBody,
{
    type Output = Result<RequestLoggingMiddleware<TracingMiddleware<S>>, ()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.inner.as_mut().poll(cx) {
            Poll::Ready(Ok(inner)) => Poll::Ready(Ok(RequestLoggingMiddleware {
                service: inner,
                dispatch: self.dispatch.clone(),
            })),
            Poll::Ready(Err(_)) => Poll::Ready(Err(())),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Runs each request under the middleware's dispatcher.
#[doc(hidden)]
pub struct RequestLoggingMiddleware<S> {
    service: S,
    dispatch: Dispatch,
}

impl<S> Service<ServiceRequest> for RequestLoggingMiddleware<S>
where
    S: Service<ServiceRequest, Error = actix_web::Error>,
    S::Future: 'static,
{
    type Response = S::Response;
    type Error = actix_web::Error;
    type Future = ServiceFuture<Self::Response, Self::Error>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let fut = tracing::dispatcher::with_default(&self.dispatch, || self.service.call(req));
        Box::pin(fut.with_subscriber(self.dispatch.clone()))
    }
}

/// Installs the request's [`Store`] around the rest of the chain.
#[doc(hidden)]
pub struct RequestScope<S> {
    service: S,
    scope: Arc<ScopeSettings>,
}

impl<S, B> Service<ServiceRequest> for RequestScope<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = ServiceFuture<Self::Response, Self::Error>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if !self.scope.routes.applies(&req) {
            return Box::pin(self.service.call(req));
        }

        let (store, initial, http) = match &self.scope.mode {
            ScopeMode::Managed(http) => {
                let logger = http.request_logger(&req);
                let response_logger = if self.scope.assign_response {
                    Some(logger.clone())
                } else {
                    None
                };
                let store = Store::new(logger.clone(), response_logger);
                (store, logger, Some(http.clone()))
            }
            ScopeMode::Existing => {
                let existing = req.extensions().get::<ExistingLogger>().cloned();
                match existing {
                    Some(existing) => {
                        let response_logger =
                            existing.response.filter(|_| self.scope.assign_response);
                        let store = Store::new(existing.request.clone(), response_logger);
                        (store, existing.request, None)
                    }
                    None => return Box::pin(self.service.call(req)),
                }
            }
        };

        let store = Arc::new(store);
        req.extensions_mut().insert(Arc::clone(&store));
        let start = Instant::now();
        let fut = storage::run_sync(Arc::clone(&store), || self.service.call(req));

        Box::pin(async move {
            let outcome = storage::run(Arc::clone(&store), fut).await;
            if let Some(http) = http {
                let logger = store.response_logger().unwrap_or(initial);
                http.log_completion(&logger, &outcome, start.elapsed());
            }
            outcome
        })
    }
}

/// A root span builder for tracing_actix_web naming each request's span
/// `request`, with its method, path, id and final status code.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScopeRootSpanBuilder;

impl RootSpanBuilder for ScopeRootSpanBuilder {
    fn on_request_start(request: &ServiceRequest) -> Span {
        let request_id = request.extensions().get::<RequestId>().cloned();

        let span = tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            request_id = tracing::field::Empty,
            status_code = tracing::field::Empty,
        );

        if let Some(request_id) = request_id {
            span.record("request_id", &tracing::field::display(request_id));
        }

        span
    }

    fn on_request_end<B: MessageBody>(
        span: Span,
        outcome: &Result<ServiceResponse<B>, actix_web::Error>,
    ) {
        let status = match outcome {
            Ok(response) => match response.response().error() {
                Some(error) => error.as_response_error().status_code(),
                None => response.status(),
            },
            Err(error) => error.as_response_error().status_code(),
        };
        span.record("status_code", u64::from(status.as_u16()));
    }
}
