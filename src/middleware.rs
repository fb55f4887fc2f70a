use crate::config::{CsrfGuardConfig, CsrfStorage};
use crate::error::CsrfError;
use crate::token::{AuthenticityToken, eq_tokens, generate_token};
#[cfg(feature = "session")]
use actix_session::SessionExt;
use actix_multipart::Multipart;
use actix_web::body::{EitherBody, MessageBody};
use actix_web::cookie::Cookie;
use actix_web::dev::{Payload, forward_ready};
use actix_web::error::PayloadError;
use actix_web::http::{Method, header};
use actix_web::web::{Bytes, BytesMut};
use actix_web::{
    Error, HttpMessage, HttpRequest,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
};
use futures_util::{
    future::{LocalBoxFuture, Ready, ok},
    stream::StreamExt,
};
use std::collections::HashMap;
use std::rc::Rc;

/// Middleware factory. Register with `App::wrap`, inside the session
/// middleware when session storage is used.
pub struct CsrfGuard {
    config: Rc<CsrfGuardConfig>,
}

impl CsrfGuard {
    pub fn new(config: CsrfGuardConfig) -> Self {
        Self {
            config: Rc::new(config),
        }
    }
}

impl Default for CsrfGuard {
    fn default() -> Self {
        Self::new(CsrfGuardConfig::default())
    }
}

impl<S, B> Transform<S, ServiceRequest> for CsrfGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = CsrfGuardMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(CsrfGuardMiddleware {
            service: Rc::new(service),
            config: Rc::clone(&self.config),
        })
    }
}

pub struct CsrfGuardMiddleware<S> {
    service: Rc<S>,
    config: Rc<CsrfGuardConfig>,
}

impl<S, B> Service<ServiceRequest> for CsrfGuardMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if self.config.is_skipped(req.path()) {
            let fut = self.service.call(req);
            return Box::pin(async move { Ok(fut.await?.map_into_left_body()) });
        }

        let (token, created) = match stored_token(&req, &self.config) {
            Some(tok) => (tok, false),
            None => {
                let tok = generate_token();
                log::debug!("issuing new authenticity token for {}", req.path());
                (tok, true)
            }
        };

        if created {
            if let Err(e) = store_in_session(&req, &self.config, &token) {
                return Box::pin(async move { Err(e) });
            }
        }

        let issue_cookie = created && self.config.storage == CsrfStorage::Cookie;

        req.extensions_mut()
            .insert(AuthenticityToken(token.clone()));

        if is_idempotent(req.method()) {
            let fut = self.service.call(req);
            let config = Rc::clone(&self.config);

            return Box::pin(async move {
                let mut res = fut.await?.map_into_left_body();
                if issue_cookie {
                    set_token_cookie(&mut res, &config, &token)?;
                }
                Ok(res)
            });
        }

        let service = Rc::clone(&self.service);
        let config = Rc::clone(&self.config);

        Box::pin(async move {
            let (http_req, mut payload) = req.into_parts();

            let mut res = match verify(&http_req, &mut payload, &config, &token).await {
                Ok(()) => {
                    let req = ServiceRequest::from_parts(http_req, payload);
                    service.call(req).await?.map_into_left_body()
                }
                Err(e) => {
                    log::warn!(
                        "rejected {} {}: {}",
                        http_req.method(),
                        http_req.path(),
                        e.kind()
                    );
                    let response = (config.on_error)(&http_req, &e);
                    ServiceResponse::new(http_req, response).map_into_right_body()
                }
            };

            if issue_cookie {
                set_token_cookie(&mut res, &config, &token)?;
            }

            Ok(res)
        })
    }
}

/// GET, HEAD, OPTIONS and TRACE pass unchecked. Everything else,
/// including methods this crate has never heard of, must carry a token.
pub fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

fn stored_token(req: &ServiceRequest, config: &CsrfGuardConfig) -> Option<String> {
    let found = match config.storage {
        #[cfg(feature = "session")]
        CsrfStorage::Session => req
            .get_session()
            .get::<String>(&config.session_key)
            .ok()
            .flatten(),
        CsrfStorage::Cookie => req
            .cookie(&config.cookie_name)
            .map(|c| c.value().to_string()),
    };
    found.filter(|tok| !tok.is_empty())
}

fn store_in_session(
    req: &ServiceRequest,
    config: &CsrfGuardConfig,
    token: &str,
) -> Result<(), Error> {
    match config.storage {
        #[cfg(feature = "session")]
        CsrfStorage::Session => req.get_session().insert(&config.session_key, token)?,
        CsrfStorage::Cookie => {}
    }
    Ok(())
}

fn set_token_cookie<B>(
    res: &mut ServiceResponse<B>,
    config: &CsrfGuardConfig,
    token: &str,
) -> Result<(), Error> {
    let cookie = Cookie::build(config.cookie_name.clone(), token.to_owned())
        .path("/")
        .http_only(true)
        .secure(config.secure)
        .same_site(config.same_site)
        .finish();
    res.response_mut().add_cookie(&cookie)?;
    Ok(())
}

async fn verify(
    req: &HttpRequest,
    payload: &mut Payload,
    config: &CsrfGuardConfig,
    expected: &str,
) -> Result<(), CsrfError> {
    if let Some(allowed) = &config.allowed_origins {
        check_origin(req, allowed)?;
    }

    let candidate = match header_token(req, &config.header_name) {
        Some(tok) => Some(tok),
        None => body_token(req, payload, config).await?,
    };

    match candidate {
        None => Err(CsrfError::TokenMissing),
        Some(tok) if eq_tokens(expected, &tok) => Ok(()),
        Some(_) => Err(CsrfError::TokenMismatch),
    }
}

/// A present, non-empty header is always the candidate, even when it is not
/// visible ASCII. Such values can never equal a generated token.
fn header_token(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .filter(|hv| !hv.is_empty())
        .map(|hv| String::from_utf8_lossy(hv.as_bytes()).into_owned())
}

enum BodyKind {
    Form,
    Json,
    Multipart,
}

fn body_kind(req: &HttpRequest, config: &CsrfGuardConfig) -> Option<BodyKind> {
    let ct = req
        .headers()
        .get(header::CONTENT_TYPE)?
        .to_str()
        .ok()?
        .to_ascii_lowercase();

    if ct.starts_with("application/x-www-form-urlencoded") {
        Some(BodyKind::Form)
    } else if ct.starts_with("application/json") {
        Some(BodyKind::Json)
    } else if config.multipart && ct.starts_with("multipart/form-data") {
        Some(BodyKind::Multipart)
    } else {
        None
    }
}

async fn body_token(
    req: &HttpRequest,
    payload: &mut Payload,
    config: &CsrfGuardConfig,
) -> Result<Option<String>, CsrfError> {
    let Some(kind) = body_kind(req, config) else {
        return Ok(None);
    };

    let declared_len = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_len.is_some_and(|len| len > config.max_body_bytes) {
        return Err(CsrfError::PayloadTooLarge);
    }

    let body = buffer_payload(payload, config.max_body_bytes).await?;

    let token = match kind {
        BodyKind::Form => serde_urlencoded::from_bytes::<HashMap<String, String>>(&body)
            .ok()
            .and_then(|form| form.get(&config.form_field).cloned()),
        BodyKind::Json => serde_json::from_slice::<serde_json::Value>(&body)
            .ok()
            .and_then(|json| {
                json.get(&config.form_field)
                    .and_then(|v| v.as_str().map(String::from))
            }),
        BodyKind::Multipart => multipart_field(req, body.clone(), &config.form_field).await,
    };

    Ok(token.filter(|tok| !tok.is_empty()))
}

/// Drains the payload into memory and puts it back so the handler can
/// still read the body.
async fn buffer_payload(payload: &mut Payload, limit: usize) -> Result<Bytes, CsrfError> {
    let mut body = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        match chunk {
            Ok(bytes) => {
                if body.len() + bytes.len() > limit {
                    return Err(CsrfError::PayloadTooLarge);
                }
                body.extend_from_slice(&bytes);
            }
            Err(e) => {
                log::debug!("failed to read request body: {e}");
                return Err(CsrfError::TokenMissing);
            }
        }
    }

    let body = body.freeze();
    *payload = Payload::from(body.clone());
    Ok(body)
}

/// Walks the parts of an already buffered multipart body and returns the
/// text of the first part named `field`.
async fn multipart_field(req: &HttpRequest, body: Bytes, field: &str) -> Option<String> {
    let stream = futures_util::stream::once(async move { Ok::<_, PayloadError>(body) });
    let mut multipart = Multipart::new(req.headers(), stream);

    let mut found = None;
    while let Some(part) = multipart.next().await {
        let mut part = match part {
            Ok(part) => part,
            Err(e) => {
                log::debug!("failed to parse multipart body: {e}");
                return None;
            }
        };
        let wanted = found.is_none() && part.name() == Some(field);

        let mut value = BytesMut::new();
        while let Some(chunk) = part.next().await {
            let chunk = chunk.ok()?;
            if wanted {
                value.extend_from_slice(&chunk);
            }
        }
        if wanted {
            found = String::from_utf8(value.to_vec()).ok();
        }
    }
    found
}

fn check_origin(req: &HttpRequest, allowed: &[String]) -> Result<(), CsrfError> {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_end_matches('/').to_ascii_lowercase())
        .or_else(|| {
            req.headers()
                .get(header::REFERER)
                .and_then(|v| v.to_str().ok())
                .and_then(origin_of)
        });

    match origin {
        Some(origin) if allowed.iter().any(|a| *a == origin) => Ok(()),
        _ => Err(CsrfError::OriginMismatch),
    }
}

/// `https://user@Example.com:8443/a?b` -> `https://example.com:8443`
fn origin_of(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    if scheme.is_empty() || host.is_empty() {
        return None;
    }
    Some(format!("{scheme}://{host}").to_ascii_lowercase())
}
