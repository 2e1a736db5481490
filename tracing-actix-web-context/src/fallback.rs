//! The process-wide logger used outside of any request.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use lazy_static::lazy_static;

use crate::{logger::Logger, params::EngineParams};

lazy_static! {
    static ref OUT_OF_CONTEXT: RwLock<Option<Logger>> = RwLock::new(None);
    static ref ROOT: RwLock<Option<Logger>> = RwLock::new(None);
}

fn read(slot: &'static RwLock<Option<Logger>>) -> RwLockReadGuard<'static, Option<Logger>> {
    match slot.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write(slot: &'static RwLock<Option<Logger>>) -> RwLockWriteGuard<'static, Option<Logger>> {
    match slot.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The fallback logger, building it from `engine` if this is the first
/// call. Later calls return the existing logger and ignore `engine`.
pub fn get_or_init(engine: &EngineParams) -> Logger {
    if let Some(logger) = read(&OUT_OF_CONTEXT).as_ref() {
        return logger.clone();
    }

    let logger = {
        let mut slot = write(&OUT_OF_CONTEXT);
        if let Some(logger) = slot.as_ref() {
            return logger.clone();
        }
        let logger = engine.build();
        *slot = Some(logger.clone());
        logger
    };
    // The slot must be unlocked here: with a `log` bridge installed, this
    // event can come back through `out_of_context`.
    tracing::debug!(level = %logger.level(), "initialized out of context logger");
    logger
}

/// The fallback logger, if one was initialized.
pub fn out_of_context() -> Option<Logger> {
    read(&OUT_OF_CONTEXT).clone()
}

/// Expose `logger` as the root handle, unless one is already set.
pub fn set_root(logger: &Logger) {
    let captured = {
        let mut slot = write(&ROOT);
        let empty = slot.is_none();
        if empty {
            *slot = Some(logger.clone());
        }
        empty
    };
    if captured {
        tracing::debug!("captured root logger");
    }
}

/// The root handle, if the middleware captured one.
pub fn root() -> Option<Logger> {
    read(&ROOT).clone()
}

/// Forget the fallback logger and the root handle.
///
/// Only meant for test suites that need a fresh process-wide state between
/// tests.
#[doc(hidden)]
pub fn reset_for_tests() {
    *write(&OUT_OF_CONTEXT) = None;
    *write(&ROOT) = None;
}
