//! Shared in-memory table with snapshot transactions.

use std::sync::{Mutex, MutexGuard, PoisonError};

use common::{AppError, AppResult};
use domain::{Record, RecordId, DEFAULT_PRIMARY_KEY};
use serde_json::Value;
use uuid::Uuid;

/// How new rows get their primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    /// Integers from a sequence
    Sequence,
    /// Random UUID strings
    Uuid,
}

#[derive(Debug)]
struct Snapshot {
    rows: Vec<Record>,
    next_id: i64,
}

#[derive(Debug)]
struct TableState {
    rows: Vec<Record>,
    next_id: i64,
    /// Transaction start, then one entry per open savepoint
    snapshots: Vec<Snapshot>,
}

impl TableState {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            rows: self.rows.clone(),
            next_id: self.next_id,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.rows = snapshot.rows;
        self.next_id = snapshot.next_id;
    }
}

/// Rows of one table, shareable between repository instances.
///
/// One transaction at a time: `begin` takes a snapshot that `rollback`
/// restores. Savepoints stack snapshots inside the open transaction.
#[derive(Debug)]
pub struct MemoryTable {
    name: String,
    primary_key: String,
    id_strategy: IdStrategy,
    state: Mutex<TableState>,
}

impl MemoryTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            id_strategy: IdStrategy::Sequence,
            state: Mutex::new(TableState {
                rows: Vec::new(),
                next_id: 1,
                snapshots: Vec::new(),
            }),
        }
    }

    pub fn with_primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = field.into();
        self
    }

    /// First id handed out by the sequence.
    pub fn starting_at(self, next_id: i64) -> Self {
        self.lock().next_id = next_id;
        self
    }

    pub fn with_uuid_ids(mut self) -> Self {
        self.id_strategy = IdStrategy::Uuid;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of every row, in insertion order.
    pub fn rows(&self) -> Vec<Record> {
        self.lock().rows.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().rows.is_empty()
    }

    /// Insert a row, assigning a primary key when it has none.
    ///
    /// Returns the row's primary key.
    pub fn insert(&self, mut row: Record) -> Value {
        let mut state = self.lock();

        let existing = row
            .get(&self.primary_key)
            .filter(|id| !id.is_null())
            .cloned();

        let id = match existing {
            Some(id) => {
                if let Some(n) = id.as_i64() {
                    state.next_id = state.next_id.max(n + 1);
                }
                id
            }
            None => {
                let id = match self.id_strategy {
                    IdStrategy::Sequence => {
                        let id = state.next_id;
                        state.next_id += 1;
                        Value::from(id)
                    }
                    IdStrategy::Uuid => Value::String(Uuid::new_v4().to_string()),
                };
                row.insert(self.primary_key.clone(), id.clone());
                id
            }
        };

        state.rows.push(row);
        id
    }

    /// Run `apply` on the rows under the table lock.
    pub(crate) fn with_rows<R>(&self, apply: impl FnOnce(&mut Vec<Record>) -> R) -> R {
        apply(&mut self.lock().rows)
    }

    /// Whether `row` has the primary key `id`.
    pub(crate) fn has_id(&self, row: &Record, id: &RecordId) -> bool {
        row.get(&self.primary_key)
            .and_then(RecordId::from_value)
            .is_some_and(|row_id| row_id.to_string() == id.to_string())
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Open the table's transaction.
    ///
    /// The table holds at most one transaction; a second `begin` before the
    /// first ends is a [`AppError::Conflict`].
    pub fn begin(&self) -> AppResult<()> {
        let mut state = self.lock();
        if !state.snapshots.is_empty() {
            return Err(AppError::conflict(format!(
                "A transaction on table {}",
                self.name
            )));
        }
        let snapshot = state.snapshot();
        state.snapshots.push(snapshot);
        Ok(())
    }

    /// Keep every change made since `begin`.
    pub fn commit(&self) -> AppResult<()> {
        let mut state = self.lock();
        if state.snapshots.is_empty() {
            return Err(self.no_transaction());
        }
        state.snapshots.clear();
        Ok(())
    }

    /// Undo every change made since `begin`, savepoints included.
    pub fn rollback(&self) -> AppResult<()> {
        let mut state = self.lock();
        let mut snapshots = std::mem::take(&mut state.snapshots);
        if snapshots.is_empty() {
            return Err(self.no_transaction());
        }
        snapshots.truncate(1);
        if let Some(snapshot) = snapshots.pop() {
            state.restore(snapshot);
        }
        Ok(())
    }

    /// Mark the current state inside the open transaction.
    pub fn savepoint(&self) -> AppResult<()> {
        let mut state = self.lock();
        if state.snapshots.is_empty() {
            return Err(self.no_transaction());
        }
        let snapshot = state.snapshot();
        state.snapshots.push(snapshot);
        Ok(())
    }

    /// Forget the latest savepoint, keeping its changes.
    pub fn release_savepoint(&self) -> AppResult<()> {
        let mut state = self.lock();
        if state.snapshots.len() < 2 {
            return Err(self.no_savepoint());
        }
        state.snapshots.pop();
        Ok(())
    }

    /// Undo the changes made since the latest savepoint and forget it.
    pub fn rollback_to_savepoint(&self) -> AppResult<()> {
        let mut state = self.lock();
        if state.snapshots.len() < 2 {
            return Err(self.no_savepoint());
        }
        if let Some(snapshot) = state.snapshots.pop() {
            state.restore(snapshot);
        }
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        !self.lock().snapshots.is_empty()
    }

    fn no_transaction(&self) -> AppError {
        AppError::storage(format!("no open transaction on table {}", self.name))
    }

    fn no_savepoint(&self) -> AppError {
        AppError::storage(format!("no savepoint on table {}", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn sequence_ids() {
        let table = MemoryTable::new("posts").starting_at(42);

        assert_eq!(table.insert(row(json!({"title": "a"}))), json!(42));
        assert_eq!(table.insert(row(json!({"title": "b"}))), json!(43));
        assert_eq!(table.insert(row(json!({"id": 100}))), json!(100));
        assert_eq!(table.insert(row(json!({}))), json!(101));
        assert_eq!(table.rows()[0]["id"], json!(42));
    }

    #[test]
    fn uuid_ids() {
        let table = MemoryTable::new("posts").with_uuid_ids();
        let id = table.insert(row(json!({"title": "a"})));

        assert!(Uuid::parse_str(id.as_str().unwrap()).is_ok());
    }

    #[test]
    fn rollback_restores_the_snapshot() {
        let table = MemoryTable::new("posts");
        table.insert(row(json!({"title": "kept"})));

        table.begin().unwrap();
        table.insert(row(json!({"title": "discarded"})));
        table.rollback().unwrap();

        assert_eq!(table.len(), 1);
        assert!(!table.in_transaction());
        assert_eq!(table.insert(row(json!({}))), json!(2));
    }

    #[test]
    fn commit_keeps_changes() {
        let table = MemoryTable::new("posts");

        table.begin().unwrap();
        table.insert(row(json!({"title": "a"})));
        table.commit().unwrap();

        assert_eq!(table.len(), 1);
        assert!(!table.in_transaction());
    }

    #[test]
    fn second_transaction_is_refused() {
        let table = MemoryTable::new("posts");

        table.begin().unwrap();
        let err = table.begin().unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // the first transaction is untouched
        table.insert(row(json!({"title": "a"})));
        table.commit().unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn savepoint_rollback_keeps_earlier_changes() {
        let table = MemoryTable::new("posts");

        table.begin().unwrap();
        table.insert(row(json!({"title": "kept"})));
        table.savepoint().unwrap();
        table.insert(row(json!({"title": "undone"})));
        table.rollback_to_savepoint().unwrap();
        assert!(table.in_transaction());
        table.commit().unwrap();

        let rows = table.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["title"], json!("kept"));
    }

    #[test]
    fn released_savepoint_is_undone_by_rollback() {
        let table = MemoryTable::new("posts");

        table.begin().unwrap();
        table.savepoint().unwrap();
        table.insert(row(json!({"title": "a"})));
        table.release_savepoint().unwrap();
        table.rollback().unwrap();

        assert!(table.is_empty());
    }

    #[test]
    fn savepoints_need_an_open_transaction() {
        let table = MemoryTable::new("posts");

        assert!(matches!(table.savepoint(), Err(AppError::Storage(_))));
        assert!(matches!(table.commit(), Err(AppError::Storage(_))));

        table.begin().unwrap();
        assert!(matches!(table.release_savepoint(), Err(AppError::Storage(_))));
        assert!(matches!(table.rollback_to_savepoint(), Err(AppError::Storage(_))));
    }
}
