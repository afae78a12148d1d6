//! Authenticating reverse proxy routes.
//!
//! `/auth/login` and `/auth/logout` manage the signed session cookie; every
//! other path is relayed to the caller's agent.

use std::fmt;
use std::sync::Arc;

use anyhow::{Result, bail};
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, FromRef, Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Form;
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use dispatch_common::config::MIN_COOKIE_SECRET_LEN;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::application::ports::{BackendResponse, ForwardRequest};
use crate::application::services::login::LoginService;
use crate::application::services::proxy::{DispatchOutcome, ProxyService};
use crate::domain::login::{LOGIN_PATH, LoginOutcome, SESSION_COOKIE};

pub const LOGOUT_PATH: &str = "/auth/logout";

pub const LOGGED_OUT_MESSAGE: &str = "You are now logged out";

#[derive(Clone)]
pub struct ProxyState {
    pub proxy: Arc<ProxyService>,
    pub login: Arc<LoginService>,
    pub key: Key,
    /// Marks the session cookie `Secure`; set when the proxy serves TLS.
    pub secure_cookies: bool,
}

impl FromRef<ProxyState> for Key {
    fn from_ref(state: &ProxyState) -> Self {
        state.key.clone()
    }
}

/// Derives the cookie signing key from the configured secret.
///
/// # Errors
///
/// Returns an error when the secret is shorter than
/// [`MIN_COOKIE_SECRET_LEN`] bytes.
pub fn session_key(secret: &str) -> Result<Key> {
    if secret.len() < MIN_COOKIE_SECRET_LEN {
        bail!(
            "cookie secret must be at least {MIN_COOKIE_SECRET_LEN} bytes, got {}",
            secret.len()
        );
    }
    Ok(Key::derive_from(secret.as_bytes()))
}

pub fn router(state: ProxyState, max_body_bytes: usize) -> Router {
    Router::new()
        .route(LOGIN_PATH, get(login_form).post(login_submit))
        .route(LOGOUT_PATH, get(logout))
        .fallback(forward)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Login ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LoginQuery {
    error: Option<String>,
}

#[derive(Deserialize)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

impl fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginForm")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

async fn login_form(Query(query): Query<LoginQuery>) -> Html<String> {
    Html(render_login_page(query.error.as_deref()))
}

async fn login_submit(
    State(state): State<ProxyState>,
    jar: SignedCookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let outcome = match state.login.login(&form.username, &form.password).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(user = %form.username, "login failed: {e}");
            return internal_error(&e.to_string());
        }
    };
    let target = outcome.redirect_target();
    match outcome {
        LoginOutcome::Authenticated(agent) => {
            info!(agent = %agent, "logged in");
            let jar = jar.add(session_cookie(agent, state.secure_cookies));
            (jar, Redirect::to(&target)).into_response()
        }
        LoginOutcome::InvalidCredentials => {
            info!(user = %form.username, "login rejected");
            Redirect::to(&target).into_response()
        }
        LoginOutcome::ServiceUnavailable => {
            warn!(user = %form.username, "login while management API unavailable");
            Redirect::to(&target).into_response()
        }
    }
}

async fn logout(jar: SignedCookieJar) -> (SignedCookieJar, &'static str) {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, LOGGED_OUT_MESSAGE)
}

fn session_cookie(agent: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, agent))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

fn render_login_page(error: Option<&str>) -> String {
    let notice = error
        .map(|message| format!("<p class=\"error\">{}</p>\n", escape_html(message)))
        .unwrap_or_default();
    format!(
        "<!DOCTYPE html>\n\
         <html>\n<head><title>Login</title></head>\n<body>\n\
         <h1>Login</h1>\n\
         {notice}\
         <form method=\"post\" action=\"{LOGIN_PATH}\">\n\
         <label>Username <input type=\"text\" name=\"username\" autofocus></label>\n\
         <label>Password <input type=\"password\" name=\"password\"></label>\n\
         <button type=\"submit\">Log in</button>\n\
         </form>\n</body>\n</html>\n"
    )
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

// ── Forwarding ────────────────────────────────────────────────────────────────

async fn forward(
    State(state): State<ProxyState>,
    jar: SignedCookieJar,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(agent) = jar
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|name| !name.is_empty())
    else {
        return unauthenticated(&headers);
    };

    let request = ForwardRequest {
        method,
        path_and_query: uri
            .path_and_query()
            .map_or_else(|| "/".to_string(), ToString::to_string),
        headers,
        body,
    };

    match state.proxy.dispatch(&agent, request).await {
        Ok(DispatchOutcome::Forwarded(response)) => relay(response),
        Ok(DispatchOutcome::Unavailable) => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Could not connect to instance {agent}!\n"),
        )
            .into_response(),
        Ok(DispatchOutcome::BackendFailed(reason)) => internal_error(&reason),
        Err(e) => {
            error!(agent = %agent, "dispatch failed: {e:#}");
            internal_error(&format!("{e:#}"))
        }
    }
}

/// Callers that cannot follow a redirect to an HTML form get a bare 401.
fn unauthenticated(headers: &HeaderMap) -> Response {
    let wants_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"));
    if wants_json || headers.contains_key("x-requested-with") {
        (StatusCode::UNAUTHORIZED, "Authentication required\n").into_response()
    } else {
        Redirect::to(LOGIN_PATH).into_response()
    }
}

fn relay(backend: BackendResponse) -> Response {
    let mut response = Response::new(Body::from(backend.body));
    *response.status_mut() = backend.status;
    *response.headers_mut() = backend.headers;
    response
}

fn internal_error(diagnostic: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Internal server error:\n{diagnostic}"),
    )
        .into_response()
}
