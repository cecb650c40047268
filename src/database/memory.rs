use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::database::repository::{TodoRepository, UserRepository};
use crate::error::{Error, Result};
use crate::models::todo::{Todo, TodoOwner, TodoPatch, TodoWithOwner};
use crate::models::user::{NewUser, Role, TodoCount, User, UserWithCount};

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    // insertion order; listings break created_at ties newest-inserted first
    todos: Vec<Todo>,
}

/// In-process store with the same ordering and cascade rules as the
/// Postgres schema. Each call takes the lock once, so every operation is
/// atomic with respect to the others.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        let mut guard = self.tables.lock().expect("memory store mutex poisoned");
        f(&mut guard)
    }
}

fn newest_first<'a>(todos: impl DoubleEndedIterator<Item = &'a Todo>) -> Vec<Todo> {
    let mut items: Vec<Todo> = todos.rev().cloned().collect();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    items
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.with(|t| t.users.iter().find(|u| u.id == id).cloned()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.with(|t| t.users.iter().find(|u| u.email == email).cloned()))
    }

    async fn insert_user(&self, user: NewUser) -> Result<User> {
        self.with(|t| {
            if t.users.iter().any(|u| u.email == user.email || u.id == user.id) {
                return Err(Error::Conflict(format!("email {} already registered", user.email)));
            }
            let user = User::from(user);
            t.users.push(user.clone());
            Ok(user)
        })
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>> {
        Ok(self.with(|t| {
            t.users.iter_mut().find(|u| u.id == id).map(|u| {
                u.role = role;
                u.clone()
            })
        }))
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool> {
        Ok(self.with(|t| {
            let before = t.users.len();
            t.users.retain(|u| u.id != id);
            let deleted = t.users.len() != before;
            if deleted {
                t.todos.retain(|todo| todo.user_id != id);
            }
            deleted
        }))
    }

    async fn list_users_with_counts(&self) -> Result<Vec<UserWithCount>> {
        Ok(self.with(|t| {
            let mut rows: Vec<UserWithCount> = t
                .users
                .iter()
                .map(|u| UserWithCount {
                    user: u.clone(),
                    count: TodoCount {
                        todos: t.todos.iter().filter(|todo| todo.user_id == u.id).count() as i64,
                    },
                })
                .collect();
            rows.sort_by(|a, b| a.user.email.cmp(&b.user.email));
            rows
        }))
    }

    async fn count_users(&self) -> Result<i64> {
        Ok(self.with(|t| t.users.len() as i64))
    }
}

#[async_trait]
impl TodoRepository for MemoryStore {
    async fn find_todo(&self, id: Uuid) -> Result<Option<Todo>> {
        Ok(self.with(|t| t.todos.iter().find(|todo| todo.id == id).cloned()))
    }

    async fn list_todos_for_user(&self, user_id: Uuid) -> Result<Vec<Todo>> {
        Ok(self.with(|t| newest_first(t.todos.iter().filter(|todo| todo.user_id == user_id))))
    }

    async fn list_todos_with_owner(&self, user_id: Option<Uuid>) -> Result<Vec<TodoWithOwner>> {
        Ok(self.with(|t| {
            let todos = newest_first(
                t.todos
                    .iter()
                    .filter(|todo| user_id.map_or(true, |id| todo.user_id == id)),
            );
            todos
                .into_iter()
                .filter_map(|todo| {
                    let owner = t.users.iter().find(|u| u.id == todo.user_id)?;
                    Some(TodoWithOwner {
                        user: TodoOwner {
                            name: owner.name.clone(),
                            email: owner.email.clone(),
                        },
                        todo,
                    })
                })
                .collect()
        }))
    }

    async fn insert_todo(&self, todo: Todo) -> Result<Todo> {
        self.with(|t| {
            if !t.users.iter().any(|u| u.id == todo.user_id) {
                return Err(Error::Internal(format!(
                    "todo owner {} does not exist",
                    todo.user_id
                )));
            }
            t.todos.push(todo.clone());
            Ok(todo)
        })
    }

    async fn update_todo(&self, id: Uuid, patch: &TodoPatch) -> Result<Option<Todo>> {
        Ok(self.with(|t| {
            t.todos.iter_mut().find(|todo| todo.id == id).map(|todo| {
                patch.apply_to(todo);
                todo.clone()
            })
        }))
    }

    async fn delete_todo(&self, id: Uuid) -> Result<bool> {
        Ok(self.with(|t| {
            let before = t.todos.len();
            t.todos.retain(|todo| todo.id != id);
            t.todos.len() != before
        }))
    }

    async fn delete_todos_for_user(&self, user_id: Uuid) -> Result<u64> {
        Ok(self.with(|t| {
            let before = t.todos.len();
            t.todos.retain(|todo| todo.user_id != user_id);
            (before - t.todos.len()) as u64
        }))
    }

    async fn count_todos_for_user(&self, user_id: Uuid) -> Result<i64> {
        Ok(self.with(|t| t.todos.iter().filter(|todo| todo.user_id == user_id).count() as i64))
    }
}
