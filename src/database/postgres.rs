use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::repository::{TodoRepository, UserRepository};
use crate::error::{Error, Result};
use crate::models::todo::{Todo, TodoOwner, TodoPatch, TodoWithOwner};
use crate::models::user::{NewUser, Role, TodoCount, User, UserWithCount};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: Option<String>,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = Error;

    fn try_from(row: UserRow) -> Result<Self> {
        let role: Role = row.role.parse().map_err(Error::Internal)?;
        Ok(User {
            id: row.id,
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            role,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct UserCountRow {
    #[sqlx(flatten)]
    user: UserRow,
    todo_count: i64,
}

#[derive(Debug, FromRow)]
struct TodoOwnerRow {
    #[sqlx(flatten)]
    todo: Todo,
    owner_name: Option<String>,
    owner_email: String,
}

const USER_COLUMNS: &str = "id, email, name, password_hash, role, created_at";
const TODO_COLUMNS: &str = "id, title, completed, created_at, user_id";

#[async_trait]
impl UserRepository for PgStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, email, name, password_hash, role, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::Conflict(format!("email {} already registered", user.email))
            }
            other => Error::from(other),
        })?;
        User::try_from(row)
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET role = $2 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool> {
        // todos go with it through ON DELETE CASCADE
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_users_with_counts(&self) -> Result<Vec<UserWithCount>> {
        let rows = sqlx::query_as::<_, UserCountRow>(
            r#"
            SELECT u.id, u.email, u.name, u.password_hash, u.role, u.created_at,
                   COUNT(t.id) AS todo_count
            FROM users u
            LEFT JOIN todos t ON t.user_id = u.id
            GROUP BY u.id
            ORDER BY u.email ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(UserWithCount {
                    user: User::try_from(row.user)?,
                    count: TodoCount {
                        todos: row.todo_count,
                    },
                })
            })
            .collect()
    }

    async fn count_users(&self) -> Result<i64> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }
}

#[async_trait]
impl TodoRepository for PgStore {
    async fn find_todo(&self, id: Uuid) -> Result<Option<Todo>> {
        let todo = sqlx::query_as::<_, Todo>(&format!(
            "SELECT {} FROM todos WHERE id = $1",
            TODO_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(todo)
    }

    async fn list_todos_for_user(&self, user_id: Uuid) -> Result<Vec<Todo>> {
        let items = sqlx::query_as::<_, Todo>(&format!(
            "SELECT {} FROM todos WHERE user_id = $1 ORDER BY created_at DESC",
            TODO_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn list_todos_with_owner(&self, user_id: Option<Uuid>) -> Result<Vec<TodoWithOwner>> {
        let rows = sqlx::query_as::<_, TodoOwnerRow>(
            r#"
            SELECT t.id, t.title, t.completed, t.created_at, t.user_id,
                   u.name AS owner_name, u.email AS owner_email
            FROM todos t
            JOIN users u ON u.id = t.user_id
            WHERE ($1::uuid IS NULL OR t.user_id = $1)
            ORDER BY t.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| TodoWithOwner {
                todo: row.todo,
                user: TodoOwner {
                    name: row.owner_name,
                    email: row.owner_email,
                },
            })
            .collect())
    }

    async fn insert_todo(&self, todo: Todo) -> Result<Todo> {
        let created = sqlx::query_as::<_, Todo>(&format!(
            r#"
            INSERT INTO todos (id, title, completed, created_at, user_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            TODO_COLUMNS
        ))
        .bind(todo.id)
        .bind(&todo.title)
        .bind(todo.completed)
        .bind(todo.created_at)
        .bind(todo.user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update_todo(&self, id: Uuid, patch: &TodoPatch) -> Result<Option<Todo>> {
        let updated = sqlx::query_as::<_, Todo>(&format!(
            r#"
            UPDATE todos
            SET
                title = COALESCE($2, title),
                completed = COALESCE($3, completed)
            WHERE id = $1
            RETURNING {}
            "#,
            TODO_COLUMNS
        ))
        .bind(id)
        .bind(&patch.title)
        .bind(patch.completed)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete_todo(&self, id: Uuid) -> Result<bool> {
        let res = sqlx::query("DELETE FROM todos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_todos_for_user(&self, user_id: Uuid) -> Result<u64> {
        let res = sqlx::query("DELETE FROM todos WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn count_todos_for_user(&self, user_id: Uuid) -> Result<i64> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM todos WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dotenvy::dotenv;
    use std::env;

    async fn setup_test_db() -> PgStore {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = crate::database::pool::create_pool(&database_url)
            .await
            .expect("Failed to create test pool");
        crate::database::pool::migrate(&pool)
            .await
            .expect("Failed to run migrations");
        PgStore::new(pool)
    }

    fn new_user() -> NewUser {
        let id = Uuid::new_v4();
        NewUser {
            id,
            email: format!("pg_{}@example.com", id),
            name: Some("Pg Test".into()),
            password_hash: "hash".into(),
            role: Role::User,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at a Postgres instance"]
    async fn test_todo_lifecycle_and_cascade() {
        let store = setup_test_db().await;
        let user = store.insert_user(new_user()).await.unwrap();

        let todo = store
            .insert_todo(Todo {
                id: Uuid::new_v4(),
                title: "Buy milk".into(),
                completed: false,
                created_at: Utc::now(),
                user_id: user.id,
            })
            .await
            .unwrap();

        let updated = store
            .update_todo(todo.id, &TodoPatch::completed(true))
            .await
            .unwrap()
            .unwrap();
        assert!(updated.completed);
        assert_eq!(updated.title, "Buy milk");

        let listed = store.list_todos_with_owner(Some(user.id)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].user.email, user.email);

        assert!(store.delete_user(user.id).await.unwrap());
        assert!(store.find_todo(todo.id).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at a Postgres instance"]
    async fn test_duplicate_email_conflicts() {
        let store = setup_test_db().await;
        let first = new_user();
        let mut second = new_user();
        second.email = first.email.clone();

        let user = store.insert_user(first).await.unwrap();
        let err = store.insert_user(second).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        store.delete_user(user.id).await.unwrap();
    }
}
