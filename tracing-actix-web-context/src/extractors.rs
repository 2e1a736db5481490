use futures_util::future::{ready, Ready};
use lazy_static::lazy_static;

use actix_web::{dev, FromRequest, HttpRequest};

use crate::{
    error::Error, module::LoggerModule, native::NativeLogger, params::Params,
    structured::StructuredLogger,
};

lazy_static! {
    static ref DEFAULT_PARAMS: Params = Params::default();
}

fn params_from_req(req: &HttpRequest) -> &Params {
    LoggerModule::from_req(req)
        .map(LoggerModule::params)
        .unwrap_or(&*DEFAULT_PARAMS)
}

impl FromRequest for StructuredLogger {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut dev::Payload) -> Self::Future {
        ready(Ok(StructuredLogger::new(params_from_req(req))))
    }
}

impl FromRequest for NativeLogger {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut dev::Payload) -> Self::Future {
        ready(Ok(NativeLogger::new(params_from_req(req))))
    }
}
