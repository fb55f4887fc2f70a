use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Reasons a mutating request is turned away.
///
/// Missing and mismatched tokens render the same message so a client cannot
/// tell them apart.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CsrfError {
    #[error("CSRF token not found in request")]
    TokenMissing,
    #[error("CSRF token not found in request")]
    TokenMismatch,
    #[error("CSRF origin check failed")]
    OriginMismatch,
    #[error("CSRF request body too large")]
    PayloadTooLarge,
}

impl CsrfError {
    /// Name used in server logs, where the distinction is kept.
    pub fn kind(&self) -> &'static str {
        match self {
            CsrfError::TokenMissing => "token_missing",
            CsrfError::TokenMismatch => "token_mismatch",
            CsrfError::OriginMismatch => "origin_mismatch",
            CsrfError::PayloadTooLarge => "payload_too_large",
        }
    }
}

impl ResponseError for CsrfError {
    fn status_code(&self) -> StatusCode {
        match self {
            CsrfError::TokenMissing | CsrfError::TokenMismatch => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            CsrfError::OriginMismatch => StatusCode::FORBIDDEN,
            CsrfError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).body(self.to_string())
    }
}
