//! Ambient, per-request storage for the active loggers.
//!
//! A [`Store`] is installed in a tokio task-local for the duration of a
//! request. Anything polled inside [`run`] (or called inside [`run_sync`])
//! can reach it through [`current`], without the store being passed around.

use std::{
    future::Future,
    sync::{Arc, RwLock},
};

use futures_util::future::Either;
use serde_json::{Map, Value};

use crate::logger::Logger;

tokio::task_local! {
    static STORE: Arc<Store>;
}

/// The loggers active for one request.
#[derive(Debug)]
pub struct Store {
    logger: RwLock<Logger>,
    response_logger: Option<RwLock<Logger>>,
}

impl Store {
    /// A store holding a request logger and, optionally, a separate
    /// response logger.
    pub fn new(logger: Logger, response_logger: Option<Logger>) -> Self {
        Self {
            logger: RwLock::new(logger),
            response_logger: response_logger.map(RwLock::new),
        }
    }

    /// The current request logger.
    pub fn logger(&self) -> Logger {
        match self.logger.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// The current response logger, when one is tracked.
    pub fn response_logger(&self) -> Option<Logger> {
        self.response_logger.as_ref().map(|lock| match lock.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        })
    }

    /// Replace the request logger, and the response logger when present,
    /// with children carrying `fields`.
    pub fn assign(&self, fields: &Map<String, Value>) {
        replace_with_child(&self.logger, fields);
        if let Some(response_logger) = &self.response_logger {
            replace_with_child(response_logger, fields);
        }
    }
}

fn replace_with_child(lock: &RwLock<Logger>, fields: &Map<String, Value>) {
    let mut guard = match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let child = guard.child(fields.clone());
    *guard = child;
}

/// Run `future` with `store` installed. The store is visible across every
/// `.await` inside it, and nowhere else.
pub async fn run<F>(store: Arc<Store>, future: F) -> F::Output
where
    F: Future,
{
    STORE.scope(store, future).await
}

/// Call `f` with `store` installed.
pub fn run_sync<F, R>(store: Arc<Store>, f: F) -> R
where
    F: FnOnce() -> R,
{
    STORE.sync_scope(store, f)
}

/// The store of the enclosing scope, if any.
pub fn current() -> Option<Arc<Store>> {
    STORE.try_with(Arc::clone).ok()
}

/// Carry the current store, if any, into `future`.
///
/// Spawned tasks do not inherit task-locals, so a future handed to
/// `tokio::spawn` or `actix_rt::spawn` from inside a request should be
/// wrapped with this first.
pub fn propagate<F>(future: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    match current() {
        Some(store) => Either::Left(STORE.scope(store, future)),
        None => Either::Right(future),
    }
}
