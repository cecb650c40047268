use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminTodoQuery {
    pub user_id: Option<Uuid>,
}

/// `DELETE /api/admin/todos` takes either `id` or `userId`; `id` wins when both are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminTodoDeleteQuery {
    pub id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRolePayload {
    pub id: Option<Uuid>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserIdQuery {
    pub id: Option<Uuid>,
}
