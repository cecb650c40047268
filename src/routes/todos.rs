use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::todo_dto::{CreateTodoPayload, TodoIdQuery, UpdateTodoPayload},
    error::{Error, Result},
    middleware::auth::Caller,
    routes::extract::{ApiJson, ApiQuery},
    AppState,
};

/// A missing id is a bad request; one that cannot name any todo reads as not found.
fn todo_id(raw: Option<&str>) -> Result<Uuid> {
    let raw = raw
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::BadRequest("id is required".into()))?;
    Uuid::parse_str(raw).map_err(|_| Error::NotFound(format!("todo {}", raw)))
}

#[utoipa::path(
    get,
    path = "/api/todos",
    responses(
        (status = 200, description = "The caller's todos, newest first"),
        (status = 401, description = "No session")
    )
)]
#[axum::debug_handler]
pub async fn list_todos(State(state): State<AppState>, caller: Caller) -> Result<impl IntoResponse> {
    let todos = state.todo_service.list(caller.principal()).await?;
    Ok(Json(todos))
}

#[utoipa::path(
    post,
    path = "/api/todos",
    request_body = CreateTodoPayload,
    responses(
        (status = 200, description = "Todo created"),
        (status = 400, description = "Empty title"),
        (status = 401, description = "No session")
    )
)]
#[axum::debug_handler]
pub async fn create_todo(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(payload): ApiJson<CreateTodoPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let todo = state
        .todo_service
        .create(caller.principal(), &payload.title)
        .await?;
    Ok(Json(todo))
}

#[utoipa::path(
    put,
    path = "/api/todos",
    request_body = UpdateTodoPayload,
    responses(
        (status = 200, description = "Todo updated"),
        (status = 400, description = "Missing id or empty title"),
        (status = 401, description = "No session"),
        (status = 404, description = "Malformed id, or no such todo owned by the caller")
    )
)]
#[axum::debug_handler]
pub async fn update_todo(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(payload): ApiJson<UpdateTodoPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let id = todo_id(payload.id.as_deref())?;
    let todo = state
        .todo_service
        .update(caller.principal(), id, payload.patch())
        .await?;
    Ok(Json(todo))
}

#[utoipa::path(
    delete,
    path = "/api/todos",
    params(
        ("id" = Option<String>, Query, description = "Todo ID")
    ),
    responses(
        (status = 204, description = "Todo deleted"),
        (status = 400, description = "Missing id"),
        (status = 401, description = "No session"),
        (status = 404, description = "No such todo owned by the caller")
    )
)]
#[axum::debug_handler]
pub async fn delete_todo(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<TodoIdQuery>,
) -> Result<impl IntoResponse> {
    let id = todo_id(query.id.as_deref())?;
    state.todo_service.delete(caller.principal(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
