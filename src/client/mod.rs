//! Client-side state for the todo screen.

pub mod api;
pub mod pending;
pub mod store;

pub use api::{ClientError, HttpTodoApi, TodoApi};
pub use store::{RefreshHandle, Snapshot, TodoStore};
