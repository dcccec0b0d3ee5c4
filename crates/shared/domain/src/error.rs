//! Errors raised by code that only sees domain types.
//!
//! Authorization contexts and caller-supplied collaborators report failures
//! with [`DomainError`]. Repositories convert it into their own error type,
//! so a denial from [`AuthContext::can`](crate::AuthContext::can) surfaces as
//! a forbidden operation.

use thiserror::Error;

use crate::auth::Action;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// The auth context refused an action on a resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Attributes or filters a collaborator rejected
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// Denial of `action` on `resource`, e.g. `Forbidden: delete on blog:post`.
    pub fn denied(action: Action, resource: &str) -> Self {
        DomainError::Forbidden(format!("{action} on {resource}"))
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        DomainError::Forbidden(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        DomainError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        DomainError::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        DomainError::Conflict(what.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        DomainError::Internal(msg.into())
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_names_the_action_and_resource() {
        let err = DomainError::denied(Action::Delete, "blog:post");

        assert_eq!(err, DomainError::Forbidden("delete on blog:post".into()));
        assert_eq!(err.to_string(), "Forbidden: delete on blog:post");
    }
}
