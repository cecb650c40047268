use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use validator::Validate;

use crate::{
    authz,
    dto::auth_dto::{CurrentSessionResponse, LoginPayload, RegisterPayload, SessionResponse},
    error::Result,
    middleware::auth::{cleared_session_cookie, session_cookie, Caller},
    routes::extract::ApiJson,
    AppState,
};

fn with_session_cookie(state: &AppState, session: SessionResponse) -> Response {
    let max_age = state.auth_service.session_ttl().num_seconds();
    let cookie = session_cookie(&session.token, max_age);
    let mut response = Json(session).into_response();
    if let Some(cookie) = cookie {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterPayload,
    responses(
        (status = 200, description = "Account created and signed in"),
        (status = 400, description = "Invalid email or password too short"),
        (status = 409, description = "Email already registered")
    )
)]
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterPayload>,
) -> Result<Response> {
    payload.validate()?;
    let session = state.auth_service.register(payload).await?;
    Ok(with_session_cookie(&state, session))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginPayload,
    responses(
        (status = 200, description = "Signed in; token returned and session cookie set"),
        (status = 401, description = "Invalid credentials")
    )
)]
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginPayload>,
) -> Result<Response> {
    payload.validate()?;
    let session = state.auth_service.login(payload).await?;
    Ok(with_session_cookie(&state, session))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 204, description = "Session cookie cleared")
    )
)]
#[axum::debug_handler]
pub async fn logout() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, cleared_session_cookie())],
    )
}

#[utoipa::path(
    get,
    path = "/api/auth/session",
    responses(
        (status = 200, description = "The signed-in principal"),
        (status = 401, description = "No session")
    )
)]
#[axum::debug_handler]
pub async fn current_session(caller: Caller) -> Result<impl IntoResponse> {
    let principal = authz::authenticate(caller.principal())?;
    Ok(Json(CurrentSessionResponse {
        user: principal.clone(),
    }))
}
