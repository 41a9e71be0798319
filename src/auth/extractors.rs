use actix_web::dev::Payload;
use actix_web::{Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};

use crate::auth::token::InvalidToken;
use crate::error::AppError;

/// The authenticated subject of the current request.
///
/// `AuthMiddleware` inserts it into the request extensions after a token
/// verifies; handlers take it as an argument. If it is absent the middleware
/// did not run, and the request is rejected as unauthenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(pub String);

impl Principal {
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl FromRequest for Principal {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.extensions().get::<Principal>().cloned() {
            Some(principal) => ready(Ok(principal)),
            None => ready(Err(AppError::from(InvalidToken).into())),
        }
    }
}
