use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::todo::TodoPatch;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTodoPayload {
    #[validate(length(min = 1, max = 500))]
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateTodoPayload {
    /// Kept as text for the same reason as [`TodoIdQuery::id`].
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 500))]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl UpdateTodoPayload {
    pub fn new(id: Uuid, patch: TodoPatch) -> Self {
        Self {
            id: Some(id.to_string()),
            title: patch.title,
            completed: patch.completed,
        }
    }

    pub fn patch(&self) -> TodoPatch {
        TodoPatch {
            title: self.title.clone(),
            completed: self.completed,
        }
    }
}

/// `?id=` on `DELETE /api/todos`. Kept as text so a malformed id reads as
/// not-found instead of leaking a parse error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TodoIdQuery {
    pub id: Option<String>,
}
