//! Record-level authorization.
//!
//! Every service operation funnels through [`authorize`] before touching the
//! store. Ownership mismatches surface as [`Denial::NotFound`] so a caller can
//! never learn whether another user's record exists.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::{Role, User};

/// The authenticated identity behind a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListOwnTodos,
    CreateOwnTodo,
    UpdateOwnTodo,
    DeleteOwnTodo,
    ListAllUsers,
    ChangeRole,
    DeleteAnyUser,
    DeleteAnyTodo,
    ListAnyTodo,
}

impl Operation {
    pub fn is_admin_scoped(&self) -> bool {
        matches!(
            self,
            Operation::ListAllUsers
                | Operation::ChangeRole
                | Operation::DeleteAnyUser
                | Operation::DeleteAnyTodo
                | Operation::ListAnyTodo
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Denial {
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("not-found")]
    NotFound,
    #[error("invalid-operation")]
    InvalidOperation,
}

/// Rule 1: a protected operation needs a principal.
pub fn authenticate(principal: Option<&Principal>) -> Result<&Principal, Denial> {
    principal.ok_or(Denial::Unauthenticated)
}

/// Rules 1 and 2 without a target record; used by the `/api/admin` route gate.
pub fn require_admin(principal: Option<&Principal>) -> Result<&Principal, Denial> {
    let principal = authenticate(principal)?;
    if principal.is_admin() {
        Ok(principal)
    } else {
        Err(Denial::Forbidden)
    }
}

/// Decide whether `principal` may perform `operation` on a record owned by
/// `resource_owner`.
///
/// For self-scoped operations `resource_owner` is the record's `userId`
/// (`None` when the record does not exist yet, i.e. on create). For
/// [`Operation::DeleteAnyUser`] it is the id of the account being deleted.
pub fn authorize(
    principal: Option<&Principal>,
    operation: Operation,
    resource_owner: Option<Uuid>,
) -> Result<(), Denial> {
    let principal = authenticate(principal)?;

    if operation.is_admin_scoped() {
        require_admin(Some(principal))?;
        if operation == Operation::DeleteAnyUser && resource_owner == Some(principal.id) {
            return Err(Denial::InvalidOperation);
        }
        return Ok(());
    }

    match resource_owner {
        None if operation == Operation::CreateOwnTodo || operation == Operation::ListOwnTodos => {
            Ok(())
        }
        Some(owner) if owner == principal.id => Ok(()),
        _ => Err(Denial::NotFound),
    }
}
