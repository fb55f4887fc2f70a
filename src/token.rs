use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use futures_util::future::{Ready, err, ok};
use rand::RngCore;
use std::fmt;

const TOKEN_LEN: usize = 32;

/// The session's authenticity token, attached to every guarded request.
///
/// Handlers take it as an extractor and embed it in rendered forms or
/// return it for use in the `X-CSRF-Token` header.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticityToken(pub String);

impl AuthenticityToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for AuthenticityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AuthenticityToken").field(&"***").finish()
    }
}

impl fmt::Display for AuthenticityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromRequest for AuthenticityToken {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        match req.authenticity_token() {
            Some(token) => ok(token),
            None => {
                log::error!("AuthenticityToken extractor used without CsrfGuard middleware");
                err(actix_web::error::ErrorInternalServerError(
                    "CSRF middleware is not configured",
                ))
            }
        }
    }
}

/// Read access to the token from places where an extractor is awkward,
/// such as template helpers that only hold the request.
pub trait CsrfRequestExt {
    fn authenticity_token(&self) -> Option<AuthenticityToken>;
}

impl CsrfRequestExt for HttpRequest {
    fn authenticity_token(&self) -> Option<AuthenticityToken> {
        self.extensions().get::<AuthenticityToken>().cloned()
    }
}

pub fn generate_token() -> String {
    let mut buf = [0u8; TOKEN_LEN];
    rand::rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Constant-time for equal-length inputs.
pub fn eq_tokens(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        result |= x ^ y;
    }
    result == 0
}
