use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::client::api::{ClientError, TodoApi};
use crate::client::pending::{PendingMutation, Speculation};
use crate::models::todo::{Todo, TodoPatch};

/// What the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub todos: Vec<Todo>,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    todos: Vec<Todo>,
    in_flight: usize,
    error: Option<String>,
    /// Bumped by `reset`; responses from an earlier session are dropped.
    generation: u64,
    /// Parent of every polling token handed out in this session.
    polling: CancellationToken,
}

/// The signed-in user's todo list as the client knows it.
///
/// Create one per session and drop it (or [`reset`](Self::reset) it) at
/// sign-out. Clones share the same state. Every mutation is applied locally
/// first, then sent; the server's answer is committed or the change is rolled
/// back. Overlapping calls are not sequenced: whichever response lands last
/// decides what is shown.
pub struct TodoStore<A> {
    api: Arc<A>,
    state: Arc<Mutex<State>>,
}

impl<A> Clone for TodoStore<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            state: self.state.clone(),
        }
    }
}

impl<A: TodoApi> TodoStore<A> {
    pub fn new(api: A) -> Self {
        Self {
            api: Arc::new(api),
            state: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("todo store mutex poisoned")
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            todos: state.todos.clone(),
            is_loading: state.in_flight > 0,
            error: state.error.clone(),
        }
    }

    pub fn todos(&self) -> Vec<Todo> {
        self.lock().todos.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().in_flight > 0
    }

    /// Forget everything, e.g. at sign-out. Polling started from this store
    /// stops, and responses still in flight are discarded when they land.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.polling.cancel();
        let generation = state.generation + 1;
        *state = State {
            generation,
            ..State::default()
        };
    }

    /// Replace the list with the server's. Failures are recorded as the error.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let generation = {
            let mut state = self.lock();
            state.in_flight += 1;
            state.error = None;
            state.generation
        };
        let outcome = self.api.list().await;

        let mut state = self.lock();
        if state.generation != generation {
            debug!("dropping refresh from a previous session");
            return outcome.map(|_| ());
        }
        state.in_flight = state.in_flight.saturating_sub(1);
        match outcome {
            Ok(todos) => {
                state.todos = todos;
                Ok(())
            }
            Err(err) => {
                state.error = Some(format!("Failed to fetch todos: {}", err));
                Err(err)
            }
        }
    }

    /// Background variant of [`refresh`](Self::refresh): no loading flag, and
    /// failures are only logged.
    pub async fn poll_once(&self) {
        let generation = self.lock().generation;
        match self.api.list().await {
            Ok(todos) => {
                let mut state = self.lock();
                if state.generation == generation {
                    state.todos = todos;
                }
            }
            Err(err) => debug!(error = %err, "todo poll failed"),
        }
    }

    pub async fn add(&self, title: &str) -> Result<Todo, ClientError> {
        let provisional = Todo {
            id: Uuid::new_v4(),
            title: title.to_string(),
            completed: false,
            created_at: Utc::now(),
            user_id: Uuid::nil(),
        };
        self.mutate(
            Speculation::Insert(provisional),
            "Failed to add todo",
            || self.api.create(title),
            |todo| Some(todo.clone()),
        )
        .await
    }

    pub async fn toggle(&self, id: Uuid) -> Result<Todo, ClientError> {
        let current = self.lock().todos.iter().find(|t| t.id == id).map(|t| t.completed);
        let Some(completed) = current else {
            return Err(self.record_unknown(id, "Failed to update todo"));
        };
        let patch = TodoPatch::completed(!completed);
        self.mutate(
            Speculation::Patch {
                id,
                patch: patch.clone(),
            },
            "Failed to update todo",
            || self.api.update(id, patch),
            |todo| Some(todo.clone()),
        )
        .await
    }

    pub async fn edit(&self, id: Uuid, title: &str) -> Result<Todo, ClientError> {
        let patch = TodoPatch::title(title);
        self.mutate(
            Speculation::Patch {
                id,
                patch: patch.clone(),
            },
            "Failed to update todo",
            || self.api.update(id, patch),
            |todo| Some(todo.clone()),
        )
        .await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ClientError> {
        self.mutate(
            Speculation::Remove(id),
            "Failed to delete todo",
            || self.api.delete(id),
            |_| None,
        )
        .await
    }

    fn record_unknown(&self, id: Uuid, context: &str) -> ClientError {
        let err = ClientError::UnknownTodo(id);
        self.lock().error = Some(format!("{}: {}", context, err));
        err
    }

    /// Speculate, call, then commit or roll back. The lock is never held
    /// across the call.
    async fn mutate<T, F, Fut>(
        &self,
        speculation: Speculation,
        context: &str,
        call: F,
        confirmed: impl FnOnce(&T) -> Option<Todo>,
    ) -> Result<T, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let target = speculation.target();
        let (pending, generation) = {
            let mut state = self.lock();
            match PendingMutation::begin(&mut state.todos, speculation) {
                Some(pending) => {
                    state.in_flight += 1;
                    state.error = None;
                    (pending, state.generation)
                }
                None => {
                    drop(state);
                    return Err(self.record_unknown(target, context));
                }
            }
        };

        let outcome = call().await;

        let mut state = self.lock();
        if state.generation != generation {
            debug!(todo_id = %target, "dropping mutation result from a previous session");
            return outcome;
        }
        state.in_flight = state.in_flight.saturating_sub(1);
        match outcome {
            Ok(value) => {
                pending.commit(&mut state.todos, confirmed(&value));
                Ok(value)
            }
            Err(err) => {
                pending.roll_back(&mut state.todos);
                state.error = Some(format!("{}: {}", context, err));
                Err(err)
            }
        }
    }

    /// Poll the server every `period`, starting immediately. Cancelling the
    /// returned handle, or resetting the store, stops future polls; one
    /// already running completes but its result is dropped after a reset.
    pub fn start_polling(&self, period: Duration) -> RefreshHandle {
        let store = self.clone();
        let token = self.lock().polling.child_token();
        let cancelled = token.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                store.poll_once().await;
            }
            debug!("todo polling stopped");
        });

        RefreshHandle {
            token,
            task: Some(task),
        }
    }
}

/// Cancellable handle to a polling task. Dropping it cancels too.
#[derive(Debug)]
pub struct RefreshHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel and wait for the task to wind down.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::api::MockTodoApi;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn todo(title: &str, completed: bool) -> Todo {
        Todo {
            id: Uuid::new_v4(),
            title: title.into(),
            completed,
            created_at: Utc::now(),
            user_id: Uuid::new_v4(),
        }
    }

    fn server_error() -> ClientError {
        ClientError::Status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    async fn loaded(mut api: MockTodoApi, todos: Vec<Todo>) -> TodoStore<MockTodoApi> {
        api.expect_list().times(1).returning(move || Ok(todos.clone()));
        let store = TodoStore::new(api);
        store.refresh().await.unwrap();
        store
    }

    #[tokio::test]
    async fn add_commits_the_server_record() {
        let server = todo("Task", false);
        let expected = server.clone();
        let mut api = MockTodoApi::new();
        api.expect_create().times(1).returning(move |title| {
            assert_eq!(title, "Task");
            Ok(server.clone())
        });
        let store = loaded(api, vec![]).await;

        let created = store.add("Task").await.unwrap();
        assert_eq!(created, expected);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.todos, vec![expected]);
        assert!(!snapshot.is_loading);
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn add_failure_rolls_back_and_records_the_error() {
        let existing = todo("existing", false);
        let mut api = MockTodoApi::new();
        api.expect_create().times(1).returning(|_| Err(server_error()));
        let store = loaded(api, vec![existing.clone()]).await;

        assert!(store.add("Task").await.is_err());
        let snapshot = store.snapshot();
        assert_eq!(snapshot.todos, vec![existing]);
        assert!(snapshot.error.unwrap().starts_with("Failed to add todo"));
    }

    #[tokio::test]
    async fn toggle_failure_restores_completed() {
        let item = todo("flip", false);
        let mut api = MockTodoApi::new();
        api.expect_update()
            .withf(|_, patch| patch.completed == Some(true) && patch.title.is_none())
            .times(1)
            .returning(|_, _| Err(server_error()));
        let store = loaded(api, vec![item.clone()]).await;

        assert!(store.toggle(item.id).await.is_err());
        assert_eq!(store.todos(), vec![item]);
        assert!(store.error().is_some());
    }

    #[tokio::test]
    async fn toggle_twice_returns_to_the_original_value() {
        let item = todo("flip", false);
        let mut api = MockTodoApi::new();
        let base = item.clone();
        api.expect_update().times(2).returning(move |_, patch| {
            let mut updated = base.clone();
            patch.apply_to(&mut updated);
            Ok(updated)
        });
        let store = loaded(api, vec![item.clone()]).await;

        assert!(store.toggle(item.id).await.unwrap().completed);
        assert!(!store.toggle(item.id).await.unwrap().completed);
        assert_eq!(store.todos()[0].completed, item.completed);
    }

    #[tokio::test]
    async fn edit_takes_the_server_answer_over_the_guess() {
        let item = todo("draft", false);
        let mut api = MockTodoApi::new();
        let base = item.clone();
        // someone completed it elsewhere in the meantime
        api.expect_update().times(1).returning(move |_, _| {
            Ok(Todo {
                title: "final".into(),
                completed: true,
                ..base.clone()
            })
        });
        let store = loaded(api, vec![item.clone()]).await;

        store.edit(item.id, "final").await.unwrap();
        let after = &store.todos()[0];
        assert_eq!(after.title, "final");
        assert!(after.completed);
    }

    #[tokio::test]
    async fn delete_failure_reinserts_in_place() {
        let (a, b, c) = (todo("a", false), todo("b", false), todo("c", true));
        let mut api = MockTodoApi::new();
        api.expect_delete().times(1).returning(|_| Err(server_error()));
        let store = loaded(api, vec![a.clone(), b.clone(), c.clone()]).await;

        assert!(store.delete(b.id).await.is_err());
        assert_eq!(store.todos(), vec![a, b, c]);
        assert!(store.error().unwrap().starts_with("Failed to delete todo"));
    }

    #[tokio::test]
    async fn delete_success_keeps_it_removed() {
        let a = todo("a", false);
        let mut api = MockTodoApi::new();
        api.expect_delete().times(1).returning(|_| Ok(()));
        let store = loaded(api, vec![a.clone()]).await;

        store.delete(a.id).await.unwrap();
        assert!(store.todos().is_empty());
    }

    #[tokio::test]
    async fn unknown_ids_never_reach_the_server() {
        let store = loaded(MockTodoApi::new(), vec![]).await;
        let missing = Uuid::new_v4();
        assert!(matches!(
            store.toggle(missing).await,
            Err(ClientError::UnknownTodo(id)) if id == missing
        ));
        assert!(matches!(
            store.delete(missing).await,
            Err(ClientError::UnknownTodo(_))
        ));
        assert!(store.error().is_some());
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn refresh_failure_is_reported_but_poll_failure_is_not() {
        let mut api = MockTodoApi::new();
        api.expect_list().times(2).returning(|| Err(server_error()));
        let store = TodoStore::new(api);

        store.poll_once().await;
        assert!(store.error().is_none());

        assert!(store.refresh().await.is_err());
        assert!(store.error().unwrap().starts_with("Failed to fetch todos"));
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let store = loaded(MockTodoApi::new(), vec![todo("a", false)]).await;
        store.reset();
        assert_eq!(store.snapshot(), Snapshot::default());
    }

    /// Holds every create until released, then fails it unless `accept` is set.
    #[derive(Default)]
    struct GatedApi {
        release: Notify,
        accept: AtomicBool,
        lists: AtomicUsize,
    }

    #[async_trait]
    impl TodoApi for Arc<GatedApi> {
        async fn list(&self) -> Result<Vec<Todo>, ClientError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }

        async fn create(&self, title: &str) -> Result<Todo, ClientError> {
            self.release.notified().await;
            if self.accept.load(Ordering::SeqCst) {
                Ok(todo(title, false))
            } else {
                Err(server_error())
            }
        }

        async fn update(&self, id: Uuid, _patch: TodoPatch) -> Result<Todo, ClientError> {
            Err(ClientError::UnknownTodo(id))
        }

        async fn delete(&self, _id: Uuid) -> Result<(), ClientError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn provisional_record_is_visible_until_the_server_answers() {
        let api = Arc::new(GatedApi::default());
        let store = TodoStore::new(api.clone());

        let adding = tokio::spawn({
            let store = store.clone();
            async move { store.add("Task").await }
        });
        while store.todos().is_empty() {
            tokio::task::yield_now().await;
        }
        let during = store.snapshot();
        assert_eq!(during.todos[0].title, "Task");
        assert!(during.is_loading);

        api.release.notify_one();
        assert!(adding.await.unwrap().is_err());
        let after = store.snapshot();
        assert!(after.todos.is_empty());
        assert!(!after.is_loading);
        assert!(after.error.is_some());
    }

    #[tokio::test]
    async fn polling_runs_until_cancelled() {
        let api = Arc::new(GatedApi::default());
        let store = TodoStore::new(api.clone());

        let handle = store.start_polling(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(75)).await;
        handle.stop().await;

        let polled = api.lists.load(Ordering::SeqCst);
        assert!(polled >= 2, "expected several polls, got {polled}");
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(api.lists.load(Ordering::SeqCst), polled);
    }

    #[tokio::test]
    async fn dropping_the_handle_cancels_polling() {
        let api = Arc::new(GatedApi::default());
        let store = TodoStore::new(api.clone());

        let handle = store.start_polling(Duration::from_millis(10));
        let token = handle.token.clone();
        drop(handle);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn add_resolving_after_reset_is_discarded() {
        let api = Arc::new(GatedApi::default());
        api.accept.store(true, Ordering::SeqCst);
        let store = TodoStore::new(api.clone());

        let adding = tokio::spawn({
            let store = store.clone();
            async move { store.add("previous session").await }
        });
        while store.todos().is_empty() {
            tokio::task::yield_now().await;
        }

        store.reset();
        api.release.notify_one();
        assert!(adding.await.unwrap().is_ok());
        assert_eq!(store.snapshot(), Snapshot::default());
    }

    #[tokio::test]
    async fn reset_stops_polling() {
        let api = Arc::new(GatedApi::default());
        let store = TodoStore::new(api.clone());

        let handle = store.start_polling(Duration::from_millis(10));
        store.reset();
        assert!(handle.is_cancelled());
        handle.stop().await;

        let polled = api.lists.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(api.lists.load(Ordering::SeqCst), polled);

        // a new session can poll again
        let again = store.start_polling(Duration::from_millis(10));
        assert!(!again.is_cancelled());
        again.stop().await;
    }
}
