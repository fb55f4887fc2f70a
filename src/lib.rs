//! Session-bound CSRF protection for actix-web.
//!
//! [`CsrfGuard`] makes sure every session carries an authenticity token and
//! attaches it to each request as an [`AuthenticityToken`]. Handlers render
//! it into forms (field `authenticity_token`) or hand it to scripts that send
//! it back in the `X-CSRF-Token` header. `GET`, `HEAD`, `OPTIONS` and `TRACE`
//! requests pass through; any other method is rejected unless it presents
//! the session's token.
//!
//! ```no_run
//! use actix_csrf_guard::{AuthenticityToken, CsrfGuard, CsrfGuardConfig};
//! use actix_session::{SessionMiddleware, storage::CookieSessionStore};
//! use actix_web::{App, HttpResponse, HttpServer, cookie::Key, web};
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     let key = Key::generate();
//!     HttpServer::new(move || {
//!         App::new()
//!             .wrap(CsrfGuard::new(CsrfGuardConfig::default()))
//!             .wrap(SessionMiddleware::new(CookieSessionStore::default(), key.clone()))
//!             .route("/csrf", web::get().to(|token: AuthenticityToken| async move {
//!                 HttpResponse::Ok().body(token.into_inner())
//!             }))
//!             .route("/csrf", web::post().to(|| async { HttpResponse::Ok().finish() }))
//!     })
//!     .bind(("127.0.0.1", 8080))?
//!     .run()
//!     .await
//! }
//! ```
//!
//! The token is read from the header first. Without it, the form field is
//! looked up in `application/x-www-form-urlencoded` and `application/json`
//! bodies. `multipart/form-data` bodies are only inspected after
//! [`CsrfGuardConfig::with_multipart`] is enabled.
//!
//! Rejected requests get a 500 with the body `CSRF token not found in
//! request`, whether the token was missing or wrong. Use
//! [`CsrfGuardConfig::with_error_status`] or [`CsrfGuardConfig::with_on_error`]
//! to answer differently.

mod config;
mod error;
mod middleware;
mod token;

pub use config::{
    AUTHENTICITY_TOKEN_KEY, CsrfGuardConfig, CsrfStorage, DEFAULT_HEADER,
    DEFAULT_MAX_BODY_BYTES, ErrorHandler,
};
pub use error::CsrfError;
pub use middleware::{CsrfGuard, CsrfGuardMiddleware, is_idempotent};
pub use token::{AuthenticityToken, CsrfRequestExt, eq_tokens, generate_token};
