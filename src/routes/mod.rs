pub mod admin;
pub mod auth;
pub mod extract;
pub mod health;
pub mod todos;

use std::path::Path;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{middleware::auth as gate, AppState};

/// The whole HTTP surface: JSON API, health check and the static UI.
pub fn router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    let static_dir = static_dir.as_ref();

    let todo_api = Router::new()
        .route(
            "/api/todos",
            get(todos::list_todos)
                .post(todos::create_todo)
                .put(todos::update_todo)
                .delete(todos::delete_todo),
        )
        .route_layer(middleware::from_fn(gate::require_user));

    let admin_api = Router::new()
        .route(
            "/api/admin/todos",
            get(admin::list_todos).delete(admin::delete_todos),
        )
        .route(
            "/api/admin/users",
            get(admin::list_users)
                .put(admin::update_role)
                .delete(admin::delete_user),
        )
        .route_layer(middleware::from_fn(gate::require_admin));

    let auth_api = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/session", get(auth::current_session));

    let admin_pages = Router::new()
        .nest_service("/admin", ServeDir::new(static_dir.join("admin")))
        .layer(middleware::from_fn(gate::require_admin_page));

    Router::new()
        .route("/health", get(health::health))
        .merge(todo_api)
        .merge(admin_api)
        .merge(auth_api)
        .merge(admin_pages)
        .fallback_service(ServeDir::new(static_dir))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gate::authenticate,
        ))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(64 * 1024))
}
