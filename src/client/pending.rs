//! Speculative edits to the local todo list.
//!
//! A [`PendingMutation`] records just enough to undo one speculative change to
//! one record. Commit and rollback both act on that record alone, so other
//! mutations that resolved in the meantime, or a refresh that replaced the
//! list, are left as they are.

use uuid::Uuid;

use crate::models::todo::{Todo, TodoPatch};

#[derive(Debug, Clone)]
pub enum Speculation {
    /// Put a provisional record at the head of the list.
    Insert(Todo),
    Patch { id: Uuid, patch: TodoPatch },
    Remove(Uuid),
}

impl Speculation {
    pub fn target(&self) -> Uuid {
        match self {
            Speculation::Insert(todo) => todo.id,
            Speculation::Patch { id, .. } => *id,
            Speculation::Remove(id) => *id,
        }
    }
}

#[derive(Debug, Clone)]
enum Undo {
    Discard(Uuid),
    /// Prior values of the patched fields only.
    Revert { id: Uuid, prior: TodoPatch },
    Reinsert { index: usize, todo: Todo },
}

#[derive(Debug, Clone)]
#[must_use = "a pending mutation must be committed or rolled back"]
pub struct PendingMutation {
    undo: Undo,
}

fn position(todos: &[Todo], id: Uuid) -> Option<usize> {
    todos.iter().position(|t| t.id == id)
}

impl PendingMutation {
    /// Applies `speculation` to `todos`. Returns `None`, leaving the list
    /// untouched, when a patch or removal targets a record that is not there.
    pub fn begin(todos: &mut Vec<Todo>, speculation: Speculation) -> Option<Self> {
        let undo = match speculation {
            Speculation::Insert(todo) => {
                let id = todo.id;
                todos.insert(0, todo);
                Undo::Discard(id)
            }
            Speculation::Patch { id, patch } => {
                let index = position(todos, id)?;
                let current = &mut todos[index];
                let prior = TodoPatch {
                    title: patch.title.as_ref().map(|_| current.title.clone()),
                    completed: patch.completed.map(|_| current.completed),
                };
                patch.apply_to(current);
                Undo::Revert { id, prior }
            }
            Speculation::Remove(id) => {
                let index = position(todos, id)?;
                let todo = todos.remove(index);
                Undo::Reinsert { index, todo }
            }
        };
        Some(Self { undo })
    }

    /// Settles the mutation with the server's answer. `confirmed` is the
    /// canonical record for inserts and patches and `None` for removals.
    pub fn commit(self, todos: &mut Vec<Todo>, confirmed: Option<Todo>) {
        match (self.undo, confirmed) {
            (Undo::Discard(provisional), Some(record)) => {
                match (position(todos, provisional), position(todos, record.id)) {
                    (Some(p), None) => todos[p] = record,
                    (Some(p), Some(existing)) => {
                        todos[existing] = record;
                        todos.remove(p);
                    }
                    (None, Some(existing)) => todos[existing] = record,
                    // a refresh dropped the provisional record before the server had it
                    (None, None) => todos.insert(0, record),
                }
            }
            (Undo::Revert { id, .. }, Some(record)) => {
                if let Some(index) = position(todos, id) {
                    todos[index] = record;
                }
            }
            (Undo::Reinsert { todo, .. }, _) => {
                todos.retain(|t| t.id != todo.id);
            }
            // nothing authoritative to reconcile with; the speculation stands
            (_, None) => {}
        }
    }

    /// Undoes the speculative change.
    pub fn roll_back(self, todos: &mut Vec<Todo>) {
        match self.undo {
            Undo::Discard(provisional) => todos.retain(|t| t.id != provisional),
            Undo::Revert { id, prior } => {
                if let Some(index) = position(todos, id) {
                    prior.apply_to(&mut todos[index]);
                }
            }
            Undo::Reinsert { index, todo } => {
                if position(todos, todo.id).is_none() {
                    let index = index.min(todos.len());
                    todos.insert(index, todo);
                }
            }
        }
    }
}
