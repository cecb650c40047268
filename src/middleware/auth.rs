use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};

use crate::authz::{self, Principal};
use crate::error::Error;
use crate::AppState;

pub const SESSION_COOKIE: &str = "session";
pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

/// Bearer header first, then the session cookie set at sign-in.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Some(token) = value.to_str().ok().and_then(|v| v.strip_prefix("Bearer ")) {
            return Some(token.trim().to_string());
        }
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token.to_string())
        .filter(|token| !token.is_empty())
}

pub fn session_cookie(token: &str, max_age_secs: i64) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    ))
    .ok()
}

pub fn cleared_session_cookie() -> HeaderValue {
    HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Attaches the request's [`Principal`], if any, as an extension. Never rejects;
/// the route gates and the services decide what an anonymous caller may do.
pub async fn authenticate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if let Some(token) = session_token(req.headers()) {
        match state.auth_service.resolve(&token).await {
            Ok(Some(principal)) => {
                req.extensions_mut().insert(principal);
            }
            Ok(None) => tracing::debug!("ignoring invalid session token"),
            Err(e) => return e.into_response(),
        }
    }
    next.run(req).await
}

fn principal_of(req: &Request) -> Option<&Principal> {
    req.extensions().get::<Principal>()
}

pub async fn require_user(req: Request, next: Next) -> Response {
    if let Err(denial) = authz::authenticate(principal_of(&req)) {
        return Error::from(denial).into_response();
    }
    next.run(req).await
}

pub async fn require_admin(req: Request, next: Next) -> Response {
    if let Err(denial) = authz::require_admin(principal_of(&req)) {
        return Error::from(denial).into_response();
    }
    next.run(req).await
}

/// Browser pages under `/admin` bounce anyone who is not an admin to the login page.
pub async fn require_admin_page(req: Request, next: Next) -> Response {
    if authz::require_admin(principal_of(&req)).is_err() {
        return Redirect::to(LOGIN_PATH).into_response();
    }
    next.run(req).await
}

/// The caller as resolved by [`authenticate`]; `None` for anonymous requests.
#[derive(Debug, Clone)]
pub struct Caller(pub Option<Principal>);

impl Caller {
    pub fn principal(&self) -> Option<&Principal> {
        self.0.as_ref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Caller(parts.extensions.get::<Principal>().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; session=from-cookie"));
        assert_eq!(session_token(&headers).as_deref(), Some("from-cookie"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(session_token(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn missing_or_empty_credentials_yield_nothing() {
        let mut headers = HeaderMap::new();
        assert!(session_token(&headers).is_none());
        headers.insert(header::COOKIE, HeaderValue::from_static("session="));
        assert!(session_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(session_token(&headers).is_none());
    }
}
