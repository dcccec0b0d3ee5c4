//! Storage adapter contract.
//!
//! A repository is generic over its adapter. The adapter supplies the
//! storage primitives, transaction control, access mode selection and scope
//! resolution. Every hook has a default that fails with
//! [`AppError::Unimplemented`], so an adapter only implements what its
//! repository uses.

use async_trait::async_trait;
use common::{AppError, AppResult};
use domain::{Action, Attributes, AuthContext, Filters, Record, RecordId, Scope};
use futures::future::BoxFuture;
use serde_json::Value;

use crate::encoding::Filtering;
use crate::pagination::{Listing, PageRequest};
use crate::record::RecordDescriptor;
use crate::settings::CustomFilters;

/// Access mode requested around a managed method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// Read query context handed to the backend.
#[derive(Clone, Copy)]
pub struct Query<'a> {
    pub scope: &'a Scope,
    pub record: &'a RecordDescriptor,
    pub custom_filters: &'a CustomFilters,
}

#[async_trait]
pub trait Adapter: Send + Sync {
    /// Operator capabilities, needed to encode filters with operators.
    fn filtering(&self) -> Option<&dyn Filtering> {
        None
    }

    /// Resolve the authorization scope of `action` on `resource`.
    fn scoped(&self, _auth: &dyn AuthContext, _resource: &str, _action: Action) -> AppResult<Scope> {
        Err(AppError::Unimplemented("scoped"))
    }

    /// Run `body` in the given access mode. Backends without access modes
    /// return the body as is.
    fn mode<'a, T: Send + 'a>(
        &'a self,
        _mode: AccessMode,
        body: BoxFuture<'a, AppResult<T>>,
    ) -> BoxFuture<'a, AppResult<T>> {
        body
    }

    async fn begin_transaction(&self) -> AppResult<()> {
        Err(AppError::Unimplemented("transaction"))
    }

    async fn commit_transaction(&self) -> AppResult<()> {
        Err(AppError::Unimplemented("transaction"))
    }

    async fn rollback_transaction(&self) -> AppResult<()> {
        Err(AppError::Unimplemented("transaction"))
    }

    /// Mark a savepoint inside the open transaction. Nested transaction
    /// levels open one so that a failing level undoes only its own writes.
    async fn create_savepoint(&self) -> AppResult<()> {
        Err(AppError::Unimplemented("savepoint"))
    }

    async fn release_savepoint(&self) -> AppResult<()> {
        Err(AppError::Unimplemented("savepoint"))
    }

    async fn rollback_to_savepoint(&self) -> AppResult<()> {
        Err(AppError::Unimplemented("savepoint"))
    }

    /// Insert a record and return its identifier.
    async fn create_impl(&self, _attributes: Attributes, _scope: &Scope) -> AppResult<Value> {
        Err(AppError::Unimplemented("create_impl"))
    }

    /// Update the record `id`. `Ok(false)` means no visible record matched.
    async fn update_impl(
        &self,
        _id: &RecordId,
        _attributes: Attributes,
        _scope: &Scope,
    ) -> AppResult<bool> {
        Err(AppError::Unimplemented("update_impl"))
    }

    /// Delete the record `id`. `Ok(false)` means no visible record matched.
    async fn delete_impl(&self, _id: &RecordId, _scope: &Scope) -> AppResult<bool> {
        Err(AppError::Unimplemented("delete_impl"))
    }

    async fn find_by_impl(&self, _filters: Filters, _query: Query<'_>) -> AppResult<Option<Record>> {
        Err(AppError::Unimplemented("find_by_impl"))
    }

    async fn index_impl(
        &self,
        _filters: Filters,
        _query: Query<'_>,
        _page: &PageRequest,
    ) -> AppResult<Listing> {
        Err(AppError::Unimplemented("index_impl"))
    }
}
