//! Domain layer - Records, identifiers, scopes and event payloads.
//!
//! This crate contains the value types exchanged between repositories,
//! storage adapters and event consumers. It has no infrastructure
//! dependencies and no async code.

pub mod auth;
pub mod constants;
pub mod error;
pub mod event;
pub mod record;

pub use auth::{Action, AllAccess, AuthContext, DenyAll, Scope, StaticAuth};
pub use constants::*;
pub use error::{DomainError, DomainResult};
pub use event::EventPayload;
pub use record::{value_kind, Attributes, Filters, Metadata, Record, RecordId};

#[cfg(any(test, feature = "test-utils"))]
pub use auth::MockAuthContext;
