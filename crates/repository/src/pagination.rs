//! Pagination types for listings.

use domain::Record;
use serde::Serialize;

use crate::include::CorrelationSet;

/// Page selection passed to the storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number
    pub page: u64,
    pub per_page: u64,
    /// Sort keys, `field` ascending or `-field` descending
    pub sort: Vec<String>,
    /// Whether the backend should count all matching records
    pub query_count: bool,
}

impl PageRequest {
    /// Number of records to skip, saturating for out-of-range pages
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }

    pub fn limit(&self) -> u64 {
        self.per_page
    }
}

/// One page of raw rows from the backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub records: Vec<Record>,
    /// Count of all matching records, when requested
    pub total: Option<u64>,
}

/// Pagination metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub page: u64,
    pub per_page: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
}

/// Result of `index`: decoded records, pagination metadata and included
/// related records.
#[derive(Debug, Serialize)]
pub struct Page {
    pub records: Vec<Record>,
    pub meta: PageMeta,
    pub included: CorrelationSet,
}

impl Page {
    pub fn new(records: Vec<Record>, request: &PageRequest, total: Option<u64>) -> Self {
        let total_pages = total.map(|total| {
            if request.per_page > 0 {
                total.div_ceil(request.per_page)
            } else {
                0
            }
        });

        Self {
            records,
            meta: PageMeta {
                page: request.page,
                per_page: request.per_page,
                total,
                total_pages,
            },
            included: CorrelationSet::new(),
        }
    }

    pub fn with_included(mut self, included: CorrelationSet) -> Self {
        self.included = included;
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(page: u64, per_page: u64) -> PageRequest {
        PageRequest {
            page,
            per_page,
            sort: Vec::new(),
            query_count: true,
        }
    }

    #[test]
    fn offset_is_zero_based() {
        assert_eq!(request(1, 50).offset(), 0);
        assert_eq!(request(3, 50).offset(), 100);
        // page 0 behaves like page 1
        assert_eq!(request(0, 50).offset(), 0);
    }

    #[test]
    fn offset_saturates_for_huge_pages() {
        assert_eq!(request(u64::MAX, 50).offset(), u64::MAX);
        assert_eq!(request(u64::MAX, 1).offset(), u64::MAX - 1);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = Page::new(Vec::new(), &request(1, 10), Some(21));
        assert_eq!(page.meta.total_pages, Some(3));

        let uncounted = Page::new(Vec::new(), &request(1, 10), None);
        assert_eq!(uncounted.meta.total_pages, None);
        assert!(uncounted.is_empty());
    }
}
