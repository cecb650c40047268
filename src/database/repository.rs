use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::todo::{Todo, TodoPatch, TodoWithOwner};
use crate::models::user::{NewUser, Role, User, UserWithCount};

/// Persistence operations on accounts.
///
/// Deleting a user must also remove every todo that user owns.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    /// Fails with `Error::Conflict` when the email is already taken.
    async fn insert_user(&self, user: NewUser) -> Result<User>;
    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>>;
    /// Returns true if a row was deleted.
    async fn delete_user(&self, id: Uuid) -> Result<bool>;
    /// Every user with their todo count, ordered by email ascending.
    async fn list_users_with_counts(&self) -> Result<Vec<UserWithCount>>;
    async fn count_users(&self) -> Result<i64>;
}

/// Persistence operations on todos. Listings are ordered newest first.
#[async_trait]
pub trait TodoRepository: Send + Sync {
    async fn find_todo(&self, id: Uuid) -> Result<Option<Todo>>;
    async fn list_todos_for_user(&self, user_id: Uuid) -> Result<Vec<Todo>>;
    async fn list_todos_with_owner(&self, user_id: Option<Uuid>) -> Result<Vec<TodoWithOwner>>;
    async fn insert_todo(&self, todo: Todo) -> Result<Todo>;
    /// Applies only the fields present in `patch`; `None` if the todo is gone.
    async fn update_todo(&self, id: Uuid, patch: &TodoPatch) -> Result<Option<Todo>>;
    async fn delete_todo(&self, id: Uuid) -> Result<bool>;
    async fn delete_todos_for_user(&self, user_id: Uuid) -> Result<u64>;
    async fn count_todos_for_user(&self, user_id: Uuid) -> Result<i64>;
}
