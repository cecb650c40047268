pub mod authz;
pub mod client;
pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::database::{MemoryStore, PgStore, TodoRepository, UserRepository};
use crate::services::{
    admin_service::AdminService,
    auth_service::{AuthService, AuthSettings},
    todo_service::TodoService,
};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub todo_service: TodoService,
    pub admin_service: AdminService,
    pub auth_service: AuthService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let config = crate::config::get_config();
        let settings = AuthSettings::new(config.jwt_secret.clone(), config.session_ttl_hours);
        Self::from_store(Arc::new(PgStore::new(pool)), settings)
    }

    /// An app backed by a fresh in-process store.
    pub fn in_memory(settings: AuthSettings) -> Self {
        Self::from_store(Arc::new(MemoryStore::new()), settings)
    }

    pub fn from_store<S>(store: Arc<S>, settings: AuthSettings) -> Self
    where
        S: UserRepository + TodoRepository + 'static,
    {
        let users: Arc<dyn UserRepository> = store.clone();
        let todos: Arc<dyn TodoRepository> = store;

        Self {
            todo_service: TodoService::new(todos.clone()),
            admin_service: AdminService::new(users.clone(), todos),
            auth_service: AuthService::new(users, settings),
        }
    }
}
