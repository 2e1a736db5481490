use std::{future::Future, sync::Arc};

use actix_web::{web, HttpRequest};

use crate::{
    middleware::RequestLogging,
    native::NativeLogger,
    params::Params,
    registry::{LoggerProviders, LoggerToken},
    structured::StructuredLogger,
};

/// Everything an application needs from this crate, built once from
/// [`Params`]: the middleware, the labelled loggers declared with
/// [`crate::inject_logger`], and the configuration the extractors read.
///
/// ```
/// use actix_web::{web, App, HttpServer};
/// use tracing_actix_web_context::{inject_logger, LoggerModule, Params, StructuredLogger};
///
/// let orders = inject_logger("Orders");
/// let module = LoggerModule::for_root(Params::default());
/// let _orders_logger = module.providers().get(&orders).cloned().unwrap();
///
/// let server = HttpServer::new(move || {
///     App::new()
///         .wrap(module.middleware())
///         .configure(|cfg| module.configure(cfg))
///         .route("/", web::get().to(|logger: StructuredLogger| async move {
///             logger.info("hello");
///             "hello"
///         }))
/// });
/// ```
#[derive(Clone, Debug)]
pub struct LoggerModule {
    params: Arc<Params>,
    providers: Arc<LoggerProviders>,
    middleware: RequestLogging,
}

impl LoggerModule {
    /// Build the module. Labels must be declared before this is called.
    pub fn for_root(params: Params) -> Self {
        let providers = LoggerProviders::build(&params);
        let middleware = RequestLogging::new(&params);
        Self {
            params: Arc::new(params),
            providers: Arc::new(providers),
            middleware,
        }
    }

    /// Build the module from parameters that are computed asynchronously,
    /// like configuration read from a remote source.
    pub async fn for_root_async<F>(params: F) -> Self
    where
        F: Future<Output = Params>,
    {
        Self::for_root(params.await)
    }

    /// The middleware, to be passed to `App::wrap`.
    pub fn middleware(&self) -> RequestLogging {
        self.middleware.clone()
    }

    /// Register the module as app data, so the logger extractors use its
    /// configuration.
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.clone()));
    }

    /// An unlabelled structured logger.
    pub fn logger(&self) -> StructuredLogger {
        StructuredLogger::new(&self.params)
    }

    /// A framework-native logger.
    pub fn native_logger(&self) -> NativeLogger {
        NativeLogger::new(&self.params)
    }

    /// The labelled loggers.
    pub fn providers(&self) -> &LoggerProviders {
        &self.providers
    }

    /// The labelled logger for `token`, as seen by a component of type `T`.
    pub fn logger_for<T: ?Sized>(&self, token: &LoggerToken) -> Option<StructuredLogger> {
        self.providers.resolve::<T>(token)
    }

    /// The parameters the module was built with.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// The module registered with [`LoggerModule::configure`], if any.
    pub fn from_req(req: &HttpRequest) -> Option<&Self> {
        req.app_data::<web::Data<LoggerModule>>()
            .map(|data| data.get_ref())
    }
}
