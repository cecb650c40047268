use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use uuid::Uuid;

use crate::{
    dto::admin_dto::{AdminTodoDeleteQuery, AdminTodoQuery, UpdateRolePayload, UserIdQuery},
    error::{Error, Result},
    middleware::auth::Caller,
    routes::extract::{ApiJson, ApiQuery},
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/admin/todos",
    params(
        ("userId" = Option<Uuid>, Query, description = "Only todos owned by this user")
    ),
    responses(
        (status = 200, description = "Todos with their owner's name and email, newest first"),
        (status = 401, description = "No session"),
        (status = 403, description = "Caller is not an admin")
    )
)]
#[axum::debug_handler]
pub async fn list_todos(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<AdminTodoQuery>,
) -> Result<impl IntoResponse> {
    let todos = state
        .admin_service
        .list_todos(caller.principal(), query.user_id)
        .await?;
    Ok(Json(todos))
}

#[utoipa::path(
    delete,
    path = "/api/admin/todos",
    params(
        ("id" = Option<Uuid>, Query, description = "Delete this todo"),
        ("userId" = Option<Uuid>, Query, description = "Delete every todo of this user")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Neither id nor userId given"),
        (status = 403, description = "Caller is not an admin")
    )
)]
#[axum::debug_handler]
pub async fn delete_todos(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<AdminTodoDeleteQuery>,
) -> Result<impl IntoResponse> {
    match (query.id, query.user_id) {
        (Some(id), _) => {
            state
                .admin_service
                .delete_todo(caller.principal(), id)
                .await?
        }
        (None, Some(user_id)) => {
            state
                .admin_service
                .delete_todos_for_user(caller.principal(), user_id)
                .await?;
        }
        (None, None) => return Err(Error::BadRequest("id or userId is required".into())),
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    responses(
        (status = 200, description = "Users with their todo counts, by email"),
        (status = 403, description = "Caller is not an admin")
    )
)]
#[axum::debug_handler]
pub async fn list_users(State(state): State<AppState>, caller: Caller) -> Result<impl IntoResponse> {
    let users = state.admin_service.list_users(caller.principal()).await?;
    Ok(Json(users))
}

#[utoipa::path(
    put,
    path = "/api/admin/users",
    request_body = UpdateRolePayload,
    responses(
        (status = 200, description = "Role changed"),
        (status = 400, description = "Missing id or role outside user/admin"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "No such user")
    )
)]
#[axum::debug_handler]
pub async fn update_role(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(payload): ApiJson<UpdateRolePayload>,
) -> Result<impl IntoResponse> {
    let (Some(id), Some(role)) = (payload.id, payload.role) else {
        return Err(Error::BadRequest("id and role are required".into()));
    };
    let user = state
        .admin_service
        .set_role(caller.principal(), id, &role)
        .await?;
    Ok(Json(user))
}

#[utoipa::path(
    delete,
    path = "/api/admin/users",
    params(
        ("id" = Option<Uuid>, Query, description = "User ID")
    ),
    responses(
        (status = 204, description = "User and their todos deleted"),
        (status = 400, description = "Missing id, or the caller's own account"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "No such user")
    )
)]
#[axum::debug_handler]
pub async fn delete_user(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<UserIdQuery>,
) -> Result<impl IntoResponse> {
    let id: Uuid = query
        .id
        .ok_or_else(|| Error::BadRequest("id is required".into()))?;
    state
        .admin_service
        .delete_user(caller.principal(), id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
