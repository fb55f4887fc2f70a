use actix_csrf_guard::{AuthenticityToken, CsrfGuard, CsrfGuardConfig, CsrfRequestExt};
use actix_http::Request;
use actix_http::body::{BoxBody, EitherBody};
#[cfg(feature = "session")]
use actix_session::{
    Session, SessionMiddleware, config::CookieContentSecurity, storage::CookieSessionStore,
};
use actix_web::cookie::Cookie;
#[cfg(feature = "session")]
use actix_web::cookie::{Key, SameSite};
use actix_web::dev::{Service, ServiceResponse};
use actix_web::{App, HttpRequest, HttpResponse, test, web};
use std::collections::HashMap;

#[allow(dead_code)]
pub const SESSION_COOKIE: &str = "id";

#[allow(dead_code)]
pub const TOKEN_MESSAGE: &str = "CSRF token not found in request";

#[cfg(feature = "session")]
#[allow(dead_code)]
pub async fn build_app(
    cfg: CsrfGuardConfig,
) -> impl Service<Request, Response = ServiceResponse<EitherBody<BoxBody>>, Error = actix_web::Error>
{
    test::init_service(
        App::new()
            .wrap(CsrfGuard::new(cfg))
            .wrap(get_session_middleware())
            .configure(configure_routes),
    )
    .await
}

#[allow(dead_code)]
pub async fn build_app_without_session(
    cfg: CsrfGuardConfig,
) -> impl Service<Request, Response = ServiceResponse<EitherBody<BoxBody>>, Error = actix_web::Error>
{
    test::init_service(
        App::new()
            .wrap(CsrfGuard::new(cfg))
            .configure(configure_routes),
    )
    .await
}

#[cfg(feature = "session")]
fn get_session_middleware() -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), Key::generate())
        .cookie_content_security(CookieContentSecurity::Private)
        .cookie_name(SESSION_COOKIE.to_string())
        .cookie_secure(false) // plain http in tests
        .cookie_http_only(true)
        .cookie_same_site(SameSite::Lax)
        .build()
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/csrf").to(render_token))
        .route("/echo", web::post().to(echo_name))
        .route("/ext", web::get().to(token_from_ext))
        .route("/open/hook", web::post().to(token_from_ext));
    #[cfg(feature = "session")]
    cfg.route("/open/visit", web::get().to(visit));
}

/// Touches the session without going through the guard.
#[cfg(feature = "session")]
async fn visit(session: Session) -> actix_web::Result<HttpResponse> {
    session.insert("visited", true)?;
    Ok(HttpResponse::Ok().finish())
}

async fn render_token(token: AuthenticityToken) -> HttpResponse {
    HttpResponse::Ok().body(token.into_inner())
}

async fn echo_name(form: web::Form<HashMap<String, String>>) -> HttpResponse {
    let name = form.get("name").cloned().unwrap_or_default();
    HttpResponse::Ok().body(name)
}

async fn token_from_ext(req: HttpRequest) -> HttpResponse {
    match req.authenticity_token() {
        Some(token) => HttpResponse::Ok().body(token.to_string()),
        None => HttpResponse::Ok().body("none"),
    }
}

/// GET /csrf, optionally within an existing session. Returns the rendered
/// token and the cookie named `cookie_name` if the response set one.
#[allow(dead_code)]
pub async fn fetch_token<S>(
    app: &S,
    cookie: Option<Cookie<'static>>,
    cookie_name: &str,
) -> (String, Option<Cookie<'static>>)
where
    S: Service<Request, Response = ServiceResponse<EitherBody<BoxBody>>, Error = actix_web::Error>,
{
    let mut req = test::TestRequest::get().uri("/csrf");
    if let Some(c) = cookie {
        req = req.cookie(c);
    }
    let resp = test::call_service(app, req.to_request()).await;
    assert!(resp.status().is_success());

    let set_cookie = resp
        .response()
        .cookies()
        .find(|c| c.name() == cookie_name)
        .map(|c| c.into_owned());

    let body = test::read_body(resp).await;
    let token = String::from_utf8(body.to_vec()).unwrap();

    (token, set_cookie)
}

/// Starts a session and returns its token and session cookie.
#[allow(dead_code)]
pub async fn new_session<S>(app: &S) -> (String, Cookie<'static>)
where
    S: Service<Request, Response = ServiceResponse<EitherBody<BoxBody>>, Error = actix_web::Error>,
{
    let (token, cookie) = fetch_token(app, None, SESSION_COOKIE).await;
    (token, cookie.expect("session cookie present"))
}

#[allow(dead_code)]
pub async fn body_string(resp: ServiceResponse<EitherBody<BoxBody>>) -> String {
    let body = test::read_body(resp).await;
    String::from_utf8(body.to_vec()).unwrap()
}
