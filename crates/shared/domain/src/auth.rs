//! Authorization context and the scopes it grants.
//!
//! The authorization engine itself is external; repositories only need to
//! ask it which rows an action may touch.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DomainError, DomainResult};
use crate::record::{Filters, Record};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Action a repository performs on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization-derived restriction on the rows an operation may touch.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Scope {
    /// Every row is reachable
    #[default]
    All,
    /// Only rows whose fields equal every entry of the filter
    Filtered(Filters),
    /// No row is reachable
    Nothing,
}

impl Scope {
    /// Whether a row falls inside this scope.
    pub fn permits(&self, record: &Record) -> bool {
        match self {
            Scope::All => true,
            Scope::Nothing => false,
            Scope::Filtered(filters) => filters
                .iter()
                .all(|(field, expected)| record.get(field).unwrap_or(&Value::Null) == expected),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Scope::All)
    }
}

/// Authorization context of the caller a repository acts for.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
pub trait AuthContext: Send + Sync {
    /// Resolve the scope granted for `action` on `resource`.
    ///
    /// Denial is reported as [`DomainError::Forbidden`].
    fn can(&self, action: Action, resource: &str) -> DomainResult<Scope>;
}

/// Grants every action on every resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllAccess;

impl AuthContext for AllAccess {
    fn can(&self, _action: Action, _resource: &str) -> DomainResult<Scope> {
        Ok(Scope::All)
    }
}

/// Denies everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl AuthContext for DenyAll {
    fn can(&self, action: Action, resource: &str) -> DomainResult<Scope> {
        Err(DomainError::denied(action, resource))
    }
}

/// Fixed per-action grants, regardless of resource.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    grants: HashMap<Action, Scope>,
}

impl StaticAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `action` with the given scope.
    pub fn grant(mut self, action: Action, scope: Scope) -> Self {
        self.grants.insert(action, scope);
        self
    }
}

impl AuthContext for StaticAuth {
    fn can(&self, action: Action, resource: &str) -> DomainResult<Scope> {
        self.grants
            .get(&action)
            .cloned()
            .ok_or_else(|| DomainError::denied(action, resource))
    }
}
