use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::authz::{self, Operation, Principal};
use crate::database::{TodoRepository, UserRepository};
use crate::error::{Error, Result};
use crate::models::todo::TodoWithOwner;
use crate::models::user::{Role, User, UserWithCount};

/// Cross-user management. Only admins get past the gate.
#[derive(Clone)]
pub struct AdminService {
    users: Arc<dyn UserRepository>,
    todos: Arc<dyn TodoRepository>,
}

impl AdminService {
    pub fn new(users: Arc<dyn UserRepository>, todos: Arc<dyn TodoRepository>) -> Self {
        Self { users, todos }
    }

    #[instrument(skip(self, caller))]
    pub async fn list_users(&self, caller: Option<&Principal>) -> Result<Vec<UserWithCount>> {
        authz::authorize(caller, Operation::ListAllUsers, None)?;
        self.users.list_users_with_counts().await
    }

    #[instrument(skip(self, caller))]
    pub async fn list_todos(
        &self,
        caller: Option<&Principal>,
        user_id: Option<Uuid>,
    ) -> Result<Vec<TodoWithOwner>> {
        authz::authorize(caller, Operation::ListAnyTodo, user_id)?;
        self.todos.list_todos_with_owner(user_id).await
    }

    #[instrument(skip(self, caller))]
    pub async fn set_role(
        &self,
        caller: Option<&Principal>,
        user_id: Uuid,
        role: &str,
    ) -> Result<User> {
        authz::authorize(caller, Operation::ChangeRole, Some(user_id))?;
        let role: Role = role.parse().map_err(Error::BadRequest)?;

        let user = self
            .users
            .set_role(user_id, role)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {}", user_id)))?;

        info!(user_id = %user_id, %role, "user role changed");
        Ok(user)
    }

    #[instrument(skip(self, caller))]
    pub async fn delete_user(&self, caller: Option<&Principal>, user_id: Uuid) -> Result<()> {
        if let Err(denial) = authz::authorize(caller, Operation::DeleteAnyUser, Some(user_id)) {
            warn!(user_id = %user_id, %denial, "user deletion denied");
            return Err(denial.into());
        }

        if !self.users.delete_user(user_id).await? {
            return Err(Error::NotFound(format!("user {}", user_id)));
        }

        info!(user_id = %user_id, "user deleted with their todos");
        Ok(())
    }

    /// Deleting a todo that is already gone is not an error.
    #[instrument(skip(self, caller))]
    pub async fn delete_todo(&self, caller: Option<&Principal>, id: Uuid) -> Result<()> {
        authz::authorize(caller, Operation::DeleteAnyTodo, None)?;
        let deleted = self.todos.delete_todo(id).await?;
        info!(todo_id = %id, deleted, "admin todo delete");
        Ok(())
    }

    #[instrument(skip(self, caller))]
    pub async fn delete_todos_for_user(
        &self,
        caller: Option<&Principal>,
        user_id: Uuid,
    ) -> Result<u64> {
        authz::authorize(caller, Operation::DeleteAnyTodo, Some(user_id))?;
        let removed = self.todos.delete_todos_for_user(user_id).await?;
        info!(user_id = %user_id, removed, "admin bulk todo delete");
        Ok(removed)
    }
}
