//! Run server with:
//!
//! ```console
//! $ cargo run --example=app
//! ```
//!
//! Test with:
//!
//! ```console
//! curl http://localhost:8080/orders/7 -H 'user-agent: demo'
//! curl http://localhost:8080/health
//! ```

use actix_web::{get, web, App, HttpResponse, HttpServer};
use serde::Serialize;
use serde_json::json;
use tracing_actix_web_context::{
    assign, inject_logger, Error, LogArgs, LoggerModule, LoggerOptions, NativeLogger, Params,
    RouteRule, StructuredLogger,
};

#[derive(Serialize)]
struct Customer {
    customer_id: u32,
}

struct Orders {
    logger: StructuredLogger,
}

impl Orders {
    async fn load(&self, id: u32) -> Result<String, Error> {
        // Every record from here on carries the customer.
        assign(Customer { customer_id: id % 3 })?;
        self.logger
            .debug(LogArgs::message("loading order %d").arg(id));
        Ok(format!("order {}", id))
    }
}

#[get("/orders/{id}")]
async fn order(id: web::Path<u32>, orders: web::Data<Orders>) -> Result<HttpResponse, Error> {
    let order = orders.load(*id).await?;
    orders.logger.info((json!({ "order": order }), "order loaded"));
    Ok(HttpResponse::Ok().body(order))
}

#[get("/health")]
async fn health(logger: NativeLogger) -> HttpResponse {
    logger.verbose("health check", &["Health".into()]);
    HttpResponse::Ok().finish()
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let orders_token = inject_logger("Orders");

    let params = Params::new()
        .with_options(LoggerOptions {
            success_message: "order request completed".to_string(),
            ..LoggerOptions::default()
        })
        .exclude(vec![RouteRule::new("/health")])
        .assign_response(true);
    let module = LoggerModule::for_root(params);

    let native = module.native_logger();
    if native.clone().install().is_err() {
        native.warn("a log implementation is already installed", &["Bootstrap".into()]);
    }
    log::info!(target: "Bootstrap", "starting HTTP server at http://localhost:8080");

    let orders = web::Data::new(Orders {
        logger: module
            .logger_for::<Orders>(&orders_token)
            .unwrap_or_else(|| module.logger()),
    });

    HttpServer::new(move || {
        App::new()
            .wrap(module.middleware())
            .configure(|cfg| module.configure(cfg))
            .app_data(orders.clone())
            .service(order)
            .service(health)
    })
    .bind(("127.0.0.1", 8080))?
    .run()
    .await
}
