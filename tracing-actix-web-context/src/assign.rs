use serde::Serialize;
use serde_json::Value;

use crate::{error::Error, storage};

/// Add `fields` to every record written through the current request's
/// logger from now on.
///
/// When the middleware was configured with `assign_response`, the
/// completion record of the request carries the fields as well.
///
/// Fails with [`Error::OutOfScope`] when called outside of a request, and
/// with [`Error::NotAnObject`] when `fields` is not a map or a struct.
///
/// ```
/// use tracing_actix_web_context::{assign, Error};
/// use serde_json::json;
///
/// assert!(matches!(assign(json!({"user": 7})), Err(Error::OutOfScope)));
/// ```
pub fn assign<T: Serialize>(fields: T) -> Result<(), Error> {
    let fields = match serde_json::to_value(fields)? {
        Value::Object(fields) => fields,
        _ => return Err(Error::NotAnObject),
    };
    let store = storage::current().ok_or(Error::OutOfScope)?;
    store.assign(&fields);
    Ok(())
}
