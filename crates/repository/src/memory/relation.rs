//! Relations between in-memory tables.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use common::AppResult;
use domain::{Action, AuthContext, Record};
use serde_json::Value;

use crate::include::{resolve_includes, Relation, RelationBatch};
use crate::record::RecordKind;

use super::MemoryTable;

fn field(record: &Record, name: &str) -> Value {
    record.get(name).cloned().unwrap_or(Value::Null)
}

/// String form of a non-null field value.
fn key_of(record: &Record, name: &str) -> Option<String> {
    match record.get(name)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn keys_of(records: &[Record], name: &str) -> HashSet<String> {
    records
        .iter()
        .filter_map(|record| key_of(record, name))
        .collect()
}

/// Rows of `target` whose `name` field is among `keys` and that the caller
/// may read.
fn fetch(
    target: &MemoryTable,
    resource: &str,
    name: &str,
    keys: &HashSet<String>,
    auth: &dyn AuthContext,
) -> AppResult<Vec<Record>> {
    let scope = auth.can(Action::Read, resource)?;

    Ok(target
        .rows()
        .into_iter()
        .filter(|row| key_of(row, name).is_some_and(|key| keys.contains(&key)))
        .filter(|row| scope.permits(row))
        .collect())
}

async fn with_nested(
    batch: RelationBatch,
    kind: &RecordKind,
    auth: &dyn AuthContext,
    sub_paths: &[String],
) -> AppResult<RelationBatch> {
    if sub_paths.is_empty() || batch.elements.is_empty() {
        return Ok(batch);
    }
    let nested = resolve_includes(sub_paths, &batch.elements, kind, auth).await?;
    Ok(batch.with_nested(nested))
}

/// Owner field holds the primary key of one target row
/// (`comment.author_id -> user.id`).
pub struct BelongsTo {
    target: Arc<MemoryTable>,
    kind: RecordKind,
    resource: String,
    foreign_key: String,
}

impl BelongsTo {
    /// `resource` is the authorization resource of the target records.
    pub fn new(
        target: Arc<MemoryTable>,
        kind: RecordKind,
        resource: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            target,
            kind,
            resource: resource.into(),
            foreign_key: foreign_key.into(),
        }
    }
}

#[async_trait]
impl Relation for BelongsTo {
    async fn resolve(
        &self,
        owners: &[Record],
        auth: &dyn AuthContext,
        sub_paths: &[String],
    ) -> AppResult<RelationBatch> {
        let keys = keys_of(owners, &self.foreign_key);
        let primary_key = self.target.primary_key().to_string();
        let elements = fetch(&self.target, &self.resource, &primary_key, &keys, auth)?;

        let foreign_key = self.foreign_key.clone();
        let batch = RelationBatch::new(
            elements,
            Box::new(move |element: &Record| field(element, &primary_key)),
            Arc::new(move |owner: &Record| field(owner, &foreign_key)),
        );

        with_nested(batch, &self.kind, auth, sub_paths).await
    }
}

/// Target rows hold the owner's primary key
/// (`post.id <- comment.post_id`).
pub struct HasMany {
    target: Arc<MemoryTable>,
    kind: RecordKind,
    resource: String,
    foreign_key: String,
    owner_key: String,
}

impl HasMany {
    pub fn new(
        target: Arc<MemoryTable>,
        kind: RecordKind,
        resource: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            target,
            kind,
            resource: resource.into(),
            foreign_key: foreign_key.into(),
            owner_key: domain::DEFAULT_PRIMARY_KEY.to_string(),
        }
    }

    /// Owner field matched against the foreign key, `id` by default.
    pub fn with_owner_key(mut self, owner_key: impl Into<String>) -> Self {
        self.owner_key = owner_key.into();
        self
    }
}

#[async_trait]
impl Relation for HasMany {
    async fn resolve(
        &self,
        owners: &[Record],
        auth: &dyn AuthContext,
        sub_paths: &[String],
    ) -> AppResult<RelationBatch> {
        let keys = keys_of(owners, &self.owner_key);
        let elements = fetch(&self.target, &self.resource, &self.foreign_key, &keys, auth)?;

        let foreign_key = self.foreign_key.clone();
        let owner_key = self.owner_key.clone();
        let batch = RelationBatch::new(
            elements,
            Box::new(move |element: &Record| field(element, &foreign_key)),
            Arc::new(move |owner: &Record| field(owner, &owner_key)),
        );

        with_nested(batch, &self.kind, auth, sub_paths).await
    }
}
