//! Options and results of the read operations.

use domain::{Record, Scope};
use serde::Serialize;

use crate::include::CorrelationSet;
use crate::record::RecordKind;

/// Options of `find_by`.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Scope to apply instead of the caller's read scope
    pub scope: Option<Scope>,
    /// Include paths, e.g. `["author", "comments.author"]`
    pub included: Vec<String>,
    /// Record kind to load instead of the repository model
    pub record: Option<RecordKind>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.included.push(path.into());
        self
    }

    pub fn record(mut self, record: RecordKind) -> Self {
        self.record = Some(record);
        self
    }
}

/// Options of `index` and `chunked_index`.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub scope: Option<Scope>,
    pub included: Vec<String>,
    /// 1-based page number
    pub page: u64,
    /// Page size; the repository default when absent
    pub items_per_page: Option<u64>,
    /// `field` ascending, `-field` descending
    pub sort: Vec<String>,
    pub record: Option<RecordKind>,
    pub query_count: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            scope: None,
            included: Vec::new(),
            page: common::DEFAULT_PAGE_NUMBER,
            items_per_page: None,
            sort: Vec::new(),
            record: None,
            query_count: true,
        }
    }
}

impl IndexOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.included.push(path.into());
        self
    }

    pub fn page(mut self, page: u64) -> Self {
        self.page = page;
        self
    }

    pub fn per_page(mut self, items_per_page: u64) -> Self {
        self.items_per_page = Some(items_per_page);
        self
    }

    pub fn sort(mut self, key: impl Into<String>) -> Self {
        self.sort.push(key.into());
        self
    }

    pub fn record(mut self, record: RecordKind) -> Self {
        self.record = Some(record);
        self
    }

    /// Skip counting all matching records.
    pub fn without_count(mut self) -> Self {
        self.query_count = false;
        self
    }
}

/// Result of `find_by`.
#[derive(Debug, Serialize)]
pub struct Found {
    pub record: Record,
    pub included: CorrelationSet,
}
