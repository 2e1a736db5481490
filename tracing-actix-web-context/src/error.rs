use actix_web::ResponseError;
use thiserror::Error;

/// An error raised by the request-scoped logging machinery.
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    #[error("unable to assign extra fields out of request scope")]
    OutOfScope,

    #[error("assigned fields could not be serialized")]
    InvalidFields(#[from] serde_json::Error),

    #[error("assigned fields must serialize to a JSON object")]
    NotAnObject,
}

impl ResponseError for Error {}
