use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::authz::{self, Operation, Principal};
use crate::database::TodoRepository;
use crate::error::{Error, Result};
use crate::models::todo::{Todo, TodoPatch};
use crate::utils::time;

/// The caller's own todo list. Every operation passes the gate first; a todo
/// that belongs to someone else is reported exactly like one that does not exist.
#[derive(Clone)]
pub struct TodoService {
    todos: Arc<dyn TodoRepository>,
}

pub(crate) fn normalize_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(Error::BadRequest("title must not be empty".into()));
    }
    Ok(trimmed.to_string())
}

impl TodoService {
    pub fn new(todos: Arc<dyn TodoRepository>) -> Self {
        Self { todos }
    }

    #[instrument(skip(self, caller))]
    pub async fn list(&self, caller: Option<&Principal>) -> Result<Vec<Todo>> {
        authz::authorize(caller, Operation::ListOwnTodos, None)?;
        let principal = authz::authenticate(caller)?;
        self.todos.list_todos_for_user(principal.id).await
    }

    #[instrument(skip(self, caller, title))]
    pub async fn create(&self, caller: Option<&Principal>, title: &str) -> Result<Todo> {
        authz::authorize(caller, Operation::CreateOwnTodo, None)?;
        let principal = authz::authenticate(caller)?;
        let title = normalize_title(title)?;

        let todo = self
            .todos
            .insert_todo(Todo {
                id: Uuid::new_v4(),
                title,
                completed: false,
                created_at: time::now(),
                user_id: principal.id,
            })
            .await?;

        info!(todo_id = %todo.id, user_id = %principal.id, "todo created");
        Ok(todo)
    }

    #[instrument(skip(self, caller, patch))]
    pub async fn update(
        &self,
        caller: Option<&Principal>,
        id: Uuid,
        mut patch: TodoPatch,
    ) -> Result<Todo> {
        self.load_owned(caller, id, Operation::UpdateOwnTodo).await?;

        if let Some(title) = patch.title.take() {
            patch.title = Some(normalize_title(&title)?);
        }

        // a concurrent delete between the read and the write still reads as not-found
        let updated = self
            .todos
            .update_todo(id, &patch)
            .await?
            .ok_or_else(|| Error::NotFound(format!("todo {}", id)))?;

        info!(todo_id = %id, "todo updated");
        Ok(updated)
    }

    #[instrument(skip(self, caller))]
    pub async fn delete(&self, caller: Option<&Principal>, id: Uuid) -> Result<()> {
        self.load_owned(caller, id, Operation::DeleteOwnTodo).await?;

        if !self.todos.delete_todo(id).await? {
            return Err(Error::NotFound(format!("todo {}", id)));
        }

        info!(todo_id = %id, "todo deleted");
        Ok(())
    }

    async fn load_owned(
        &self,
        caller: Option<&Principal>,
        id: Uuid,
        operation: Operation,
    ) -> Result<Todo> {
        authz::authenticate(caller)?;
        let todo = self.todos.find_todo(id).await?;
        let owner = todo.as_ref().map(|t| t.user_id);

        if let Err(denial) = authz::authorize(caller, operation, owner) {
            warn!(todo_id = %id, ?operation, %denial, "todo access denied");
            return Err(denial.into());
        }

        todo.ok_or_else(|| Error::NotFound(format!("todo {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MemoryStore, UserRepository};
    use crate::models::user::{NewUser, Role};

    async fn setup() -> (TodoService, Principal, Principal) {
        let store = Arc::new(MemoryStore::new());
        let mut principals = Vec::new();
        for email in ["alice@example.com", "bob@example.com"] {
            let user = store
                .insert_user(NewUser {
                    id: Uuid::new_v4(),
                    email: email.into(),
                    name: None,
                    password_hash: "hash".into(),
                    role: Role::User,
                    created_at: time::now(),
                })
                .await
                .unwrap();
            principals.push(Principal::from(&user));
        }
        let bob = principals.pop().unwrap();
        let alice = principals.pop().unwrap();
        (TodoService::new(store), alice, bob)
    }

    #[tokio::test]
    async fn create_list_update_delete_round_trip() {
        let (service, alice, _) = setup().await;

        let created = service.create(Some(&alice), "Buy milk").await.unwrap();
        assert_eq!(created.title, "Buy milk");
        assert!(!created.completed);
        assert_eq!(created.user_id, alice.id);

        let listed = service.list(Some(&alice)).await.unwrap();
        assert_eq!(listed, vec![created.clone()]);

        let updated = service
            .update(Some(&alice), created.id, TodoPatch::completed(true))
            .await
            .unwrap();
        assert!(updated.completed);
        assert_eq!(updated.title, "Buy milk");

        service.delete(Some(&alice), created.id).await.unwrap();
        assert!(service.list(Some(&alice)).await.unwrap().is_empty());

        let again = service.delete(Some(&alice), created.id).await.unwrap_err();
        assert!(matches!(again, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn blank_titles_are_rejected() {
        let (service, alice, _) = setup().await;
        let err = service.create(Some(&alice), "   ").await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));

        let todo = service.create(Some(&alice), "  padded  ").await.unwrap();
        assert_eq!(todo.title, "padded");

        let err = service
            .update(Some(&alice), todo.id, TodoPatch::title(""))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn foreign_todos_read_as_not_found() {
        let (service, alice, bob) = setup().await;
        let todo = service.create(Some(&alice), "private").await.unwrap();

        let err = service
            .update(Some(&bob), todo.id, TodoPatch::completed(true))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = service.delete(Some(&bob), todo.id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        assert!(service.list(Some(&bob)).await.unwrap().is_empty());
        let untouched = service.list(Some(&alice)).await.unwrap();
        assert!(!untouched[0].completed);
    }

    #[tokio::test]
    async fn anonymous_callers_are_unauthenticated() {
        let (service, _, _) = setup().await;
        assert!(matches!(
            service.list(None).await.unwrap_err(),
            Error::Unauthorized(_)
        ));
        assert!(matches!(
            service.create(None, "x").await.unwrap_err(),
            Error::Unauthorized(_)
        ));
        assert!(matches!(
            service.delete(None, Uuid::new_v4()).await.unwrap_err(),
            Error::Unauthorized(_)
        ));
    }

    #[tokio::test]
    async fn toggling_twice_restores_the_original_state() {
        let (service, alice, _) = setup().await;
        let todo = service.create(Some(&alice), "flip").await.unwrap();

        let once = service
            .update(Some(&alice), todo.id, TodoPatch::completed(!todo.completed))
            .await
            .unwrap();
        let twice = service
            .update(Some(&alice), todo.id, TodoPatch::completed(!once.completed))
            .await
            .unwrap();
        assert_eq!(twice.completed, todo.completed);
    }
}
