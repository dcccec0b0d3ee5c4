//! In-memory storage adapter.
//!
//! Backs repositories with [`MemoryTable`]s. Tables are shared through
//! `Arc`, so several repository instances (one per caller) can work on the
//! same rows.

mod filtering;
mod relation;
mod table;

pub use filtering::MemoryFiltering;
pub use relation::{BelongsTo, HasMany};
pub use table::{IdStrategy, MemoryTable};

use std::sync::Arc;

use async_trait::async_trait;
use common::{AppError, AppResult};
use domain::{Action, Attributes, AuthContext, Filters, Record, RecordId, Scope};
use serde_json::Value;
use tracing::debug;

use crate::adapter::{Adapter, Query};
use crate::encoding::Filtering;
use crate::pagination::{Listing, PageRequest};

/// Adapter over one shared [`MemoryTable`].
#[derive(Debug, Clone)]
pub struct MemoryAdapter {
    table: Arc<MemoryTable>,
    filtering: MemoryFiltering,
}

impl MemoryAdapter {
    pub fn new(table: Arc<MemoryTable>) -> Self {
        Self {
            table,
            filtering: MemoryFiltering,
        }
    }

    pub fn table(&self) -> &Arc<MemoryTable> {
        &self.table
    }

    /// Rows visible under `query` that match `filters`, in storage order.
    fn select(&self, filters: &Filters, query: &Query<'_>) -> AppResult<Vec<Record>> {
        let mut selected = Vec::new();
        for row in self.table.rows() {
            if query.scope.permits(&row)
                && self.filtering.matches(&row, filters, query.custom_filters)?
            {
                selected.push(row);
            }
        }
        Ok(selected)
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn filtering(&self) -> Option<&dyn Filtering> {
        Some(&self.filtering)
    }

    fn scoped(&self, auth: &dyn AuthContext, resource: &str, action: Action) -> AppResult<Scope> {
        Ok(auth.can(action, resource)?)
    }

    async fn begin_transaction(&self) -> AppResult<()> {
        self.table.begin()
    }

    async fn commit_transaction(&self) -> AppResult<()> {
        self.table.commit()
    }

    async fn rollback_transaction(&self) -> AppResult<()> {
        self.table.rollback()
    }

    async fn create_savepoint(&self) -> AppResult<()> {
        self.table.savepoint()
    }

    async fn release_savepoint(&self) -> AppResult<()> {
        self.table.release_savepoint()
    }

    async fn rollback_to_savepoint(&self) -> AppResult<()> {
        self.table.rollback_to_savepoint()
    }

    async fn create_impl(&self, attributes: Attributes, scope: &Scope) -> AppResult<Value> {
        if !scope.permits(&attributes) {
            return Err(AppError::Forbidden(format!(
                "create on {} outside of the granted scope",
                self.table.name()
            )));
        }

        let id = self.table.insert(attributes);
        debug!(table = self.table.name(), %id, "row inserted");
        Ok(id)
    }

    async fn update_impl(
        &self,
        id: &RecordId,
        attributes: Attributes,
        scope: &Scope,
    ) -> AppResult<bool> {
        let primary_key = self.table.primary_key().to_string();

        let updated = self.table.with_rows(|rows| {
            let Some(row) = rows
                .iter_mut()
                .find(|row| self.table.has_id(row, id) && scope.permits(row))
            else {
                return false;
            };

            for (field, value) in attributes {
                if field != primary_key {
                    row.insert(field, value);
                }
            }
            true
        });

        debug!(table = self.table.name(), %id, updated, "row update");
        Ok(updated)
    }

    async fn delete_impl(&self, id: &RecordId, scope: &Scope) -> AppResult<bool> {
        let deleted = self.table.with_rows(|rows| {
            let position = rows
                .iter()
                .position(|row| self.table.has_id(row, id) && scope.permits(row));

            match position {
                Some(position) => {
                    rows.remove(position);
                    true
                }
                None => false,
            }
        });

        debug!(table = self.table.name(), %id, deleted, "row delete");
        Ok(deleted)
    }

    async fn find_by_impl(&self, filters: Filters, query: Query<'_>) -> AppResult<Option<Record>> {
        Ok(self.select(&filters, &query)?.into_iter().next())
    }

    async fn index_impl(
        &self,
        filters: Filters,
        query: Query<'_>,
        page: &PageRequest,
    ) -> AppResult<Listing> {
        let mut rows = self.select(&filters, &query)?;
        filtering::sort_rows(&mut rows, &page.sort);

        let total = page.query_count.then_some(rows.len() as u64);

        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
        let records = rows.into_iter().skip(offset).take(limit).collect();

        Ok(Listing { records, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordDescriptor;
    use crate::settings::CustomFilters;
    use domain::{DenyAll, StaticAuth};
    use serde_json::json;

    fn map(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn seeded() -> MemoryAdapter {
        let table = Arc::new(MemoryTable::new("posts"));
        for (title, author) in [("a", 1), ("b", 2), ("c", 1), ("d", 1)] {
            table.insert(map(json!({"title": title, "author_id": author})));
        }
        MemoryAdapter::new(table)
    }

    fn page(page: u64, per_page: u64, sort: &[&str]) -> PageRequest {
        PageRequest {
            page,
            per_page,
            sort: sort.iter().map(|key| key.to_string()).collect(),
            query_count: true,
        }
    }

    #[tokio::test]
    async fn index_filters_sorts_and_paginates() {
        let adapter = seeded();
        let kind = RecordDescriptor::new("post");
        let custom = CustomFilters::new();
        let query = Query {
            scope: &Scope::All,
            record: &kind,
            custom_filters: &custom,
        };

        let listing = adapter
            .index_impl(map(json!({"author_id": 1})), query, &page(1, 2, &["-title"]))
            .await
            .unwrap();

        let titles: Vec<&str> = listing
            .records
            .iter()
            .map(|row| row["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["d", "c"]);
        assert_eq!(listing.total, Some(3));

        let listing = adapter
            .index_impl(map(json!({"author_id": 1})), query, &page(2, 2, &["-title"]))
            .await
            .unwrap();
        assert_eq!(listing.records.len(), 1);
    }

    #[tokio::test]
    async fn scope_restricts_every_primitive() {
        let adapter = seeded();
        let scope = Scope::Filtered(map(json!({"author_id": 2})));

        assert!(!adapter.update_impl(&RecordId::from(1), map(json!({"title": "x"})), &scope).await.unwrap());
        assert!(adapter.update_impl(&RecordId::from(2), map(json!({"title": "x"})), &scope).await.unwrap());
        assert!(!adapter.delete_impl(&RecordId::from(3), &scope).await.unwrap());

        let err = adapter
            .create_impl(map(json!({"title": "e", "author_id": 1})), &scope)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let kind = RecordDescriptor::new("post");
        let custom = CustomFilters::new();
        let query = Query {
            scope: &Scope::Nothing,
            record: &kind,
            custom_filters: &custom,
        };
        assert!(adapter.find_by_impl(Filters::new(), query).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_does_not_touch_the_primary_key() {
        let adapter = seeded();

        adapter
            .update_impl(&RecordId::from("1"), map(json!({"id": 99, "title": "z"})), &Scope::All)
            .await
            .unwrap();

        let row = &adapter.table().rows()[0];
        assert_eq!(row["id"], json!(1));
        assert_eq!(row["title"], json!("z"));
    }

    #[test]
    fn scoped_delegates_to_the_auth_context() {
        let adapter = seeded();

        let err = adapter.scoped(&DenyAll, "blog:post", Action::Read).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let auth = StaticAuth::new().grant(Action::Read, Scope::All);
        assert_eq!(adapter.scoped(&auth, "blog:post", Action::Read).unwrap(), Scope::All);
    }

    #[tokio::test]
    async fn transaction_hooks_drive_the_table() {
        let adapter = seeded();

        adapter.begin_transaction().await.unwrap();
        adapter.delete_impl(&RecordId::from(1), &Scope::All).await.unwrap();
        adapter.rollback_transaction().await.unwrap();

        assert_eq!(adapter.table().len(), 4);
    }

    #[tokio::test]
    async fn savepoint_hooks_undo_only_the_inner_level() {
        let adapter = seeded();

        adapter.begin_transaction().await.unwrap();
        adapter.delete_impl(&RecordId::from(1), &Scope::All).await.unwrap();
        adapter.create_savepoint().await.unwrap();
        adapter.delete_impl(&RecordId::from(2), &Scope::All).await.unwrap();
        adapter.rollback_to_savepoint().await.unwrap();
        adapter.commit_transaction().await.unwrap();

        assert_eq!(adapter.table().len(), 3);
    }
}
