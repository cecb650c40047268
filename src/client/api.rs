use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::json;
use uuid::Uuid;

use crate::dto::todo_dto::UpdateTodoPayload;
use crate::models::todo::{Todo, TodoPatch};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {0}")]
    Status(StatusCode),

    #[error("todo {0} is not in the local list")]
    UnknownTodo(Uuid),
}

/// The todo endpoints as seen from a signed-in client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TodoApi: Send + Sync + 'static {
    async fn list(&self) -> Result<Vec<Todo>, ClientError>;
    async fn create(&self, title: &str) -> Result<Todo, ClientError>;
    async fn update(&self, id: Uuid, patch: TodoPatch) -> Result<Todo, ClientError>;
    async fn delete(&self, id: Uuid) -> Result<(), ClientError>;
}

/// [`TodoApi`] over HTTP with a bearer session token.
#[derive(Clone)]
pub struct HttpTodoApi {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpTodoApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url, token)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn todos_url(&self) -> String {
        format!("{}/api/todos", self.base_url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            tracing::debug!(%status, "todo api call failed");
            Err(ClientError::Status(status))
        }
    }
}

#[async_trait]
impl TodoApi for HttpTodoApi {
    async fn list(&self) -> Result<Vec<Todo>, ClientError> {
        let response = self.send(self.client.get(self.todos_url())).await?;
        Ok(response.json().await?)
    }

    async fn create(&self, title: &str) -> Result<Todo, ClientError> {
        let response = self
            .send(self.client.post(self.todos_url()).json(&json!({ "title": title })))
            .await?;
        Ok(response.json().await?)
    }

    async fn update(&self, id: Uuid, patch: TodoPatch) -> Result<Todo, ClientError> {
        let body = UpdateTodoPayload::new(id, patch);
        let response = self
            .send(self.client.put(self.todos_url()).json(&body))
            .await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, id: Uuid) -> Result<(), ClientError> {
        self.send(
            self.client
                .delete(self.todos_url())
                .query(&[("id", id.to_string())]),
        )
        .await?;
        Ok(())
    }
}
