use crate::error::CsrfError;
use actix_web::cookie::SameSite;
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use std::rc::Rc;

/// Session key, cookie name and form field the token travels under by default.
pub const AUTHENTICITY_TOKEN_KEY: &str = "authenticity_token";
pub const DEFAULT_HEADER: &str = "X-CSRF-Token";
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Where the authenticity token is kept between requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CsrfStorage {
    #[cfg(feature = "session")]
    Session,
    Cookie,
}

pub type ErrorHandler = Rc<dyn Fn(&HttpRequest, &CsrfError) -> HttpResponse>;

#[derive(Clone)]
pub struct CsrfGuardConfig {
    pub storage: CsrfStorage,
    pub session_key: String,
    pub cookie_name: String,
    pub header_name: String,
    pub form_field: String,
    pub secure: bool, // cookie storage only
    pub same_site: SameSite,
    pub skip_for: Vec<String>,
    pub max_body_bytes: usize,
    /// Also look for the token in `multipart/form-data` bodies.
    pub multipart: bool,
    /// When set, mutating requests must come from one of these origins.
    pub allowed_origins: Option<Vec<String>>,
    pub on_error: ErrorHandler,
}

impl Default for CsrfGuardConfig {
    fn default() -> Self {
        CsrfGuardConfig {
            #[cfg(feature = "session")]
            storage: CsrfStorage::Session,
            #[cfg(not(feature = "session"))]
            storage: CsrfStorage::Cookie,
            session_key: AUTHENTICITY_TOKEN_KEY.into(),
            cookie_name: AUTHENTICITY_TOKEN_KEY.into(),
            header_name: DEFAULT_HEADER.into(),
            form_field: AUTHENTICITY_TOKEN_KEY.into(),
            secure: true,
            same_site: SameSite::Strict,
            skip_for: vec![],
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            multipart: false,
            allowed_origins: None,
            on_error: Rc::new(|_: &HttpRequest, err: &CsrfError| err.error_response()),
        }
    }
}

impl CsrfGuardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the token in a dedicated cookie instead of the session.
    pub fn cookie_storage() -> Self {
        CsrfGuardConfig {
            storage: CsrfStorage::Cookie,
            ..Default::default()
        }
    }

    pub fn with_storage(mut self, storage: CsrfStorage) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = key.into();
        self
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    pub fn with_form_field(mut self, field: impl Into<String>) -> Self {
        self.form_field = field.into();
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Path prefixes the guard ignores entirely. Prefixes match whole
    /// segments: `/open` covers `/open` and `/open/hook` but not `/openly`.
    pub fn with_skip_for(mut self, prefixes: Vec<String>) -> Self {
        self.skip_for = prefixes;
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn with_multipart(mut self, enabled: bool) -> Self {
        self.multipart = enabled;
        self
    }

    /// Origins are compared as `scheme://host[:port]`, without a trailing slash.
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = Some(
            origins
                .into_iter()
                .map(|o| o.trim_end_matches('/').to_ascii_lowercase())
                .collect(),
        );
        self
    }

    /// Respond to token failures with `status` instead of 500. Origin and
    /// body size failures keep their own status codes.
    pub fn with_error_status(mut self, status: StatusCode) -> Self {
        self.on_error = Rc::new(move |_: &HttpRequest, err: &CsrfError| match err {
            CsrfError::TokenMissing | CsrfError::TokenMismatch => {
                HttpResponse::build(status).body(err.to_string())
            }
            _ => err.error_response(),
        });
        self
    }

    pub fn with_on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&HttpRequest, &CsrfError) -> HttpResponse + 'static,
    {
        self.on_error = Rc::new(handler);
        self
    }

    pub(crate) fn is_skipped(&self, path: &str) -> bool {
        self.skip_for.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str()).is_some_and(|rest| {
                rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/')
            })
        })
    }
}
