//! Filter evaluation and sorting for in-memory rows.

use std::cmp::Ordering;

use common::{AppError, AppResult};
use domain::{split_filter_key, Filters, Record};
use serde_json::Value;

use crate::encoding::Filtering;
use crate::settings::CustomFilters;

/// Operators understood by the in-memory backend.
///
/// A bare key means equality; `field__<op>` selects one of `neq`, `in`,
/// `nin`, `gt`, `gte`, `lt`, `lte`, `like` (substring match).
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryFiltering;

impl Filtering for MemoryFiltering {
    fn expects_array(&self, operator: &str) -> bool {
        matches!(operator, "in" | "nin")
    }
}

impl MemoryFiltering {
    /// Whether `record` satisfies every filter.
    pub fn matches(
        &self,
        record: &Record,
        filters: &Filters,
        custom_filters: &CustomFilters,
    ) -> AppResult<bool> {
        for (key, expected) in filters {
            if let Some(custom) = custom_filters.get(key) {
                if !custom(record, expected) {
                    return Ok(false);
                }
                continue;
            }

            let (field, operator) = split_filter_key(key);
            let actual = record.get(field).unwrap_or(&Value::Null);

            if !apply(actual, operator, expected)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn apply(actual: &Value, operator: Option<&str>, expected: &Value) -> AppResult<bool> {
    let matched = match operator {
        None | Some("eq") => loosely_equal(actual, expected),
        Some("neq") => !loosely_equal(actual, expected),
        Some("in") => list(expected)?.iter().any(|item| loosely_equal(actual, item)),
        Some("nin") => !list(expected)?.iter().any(|item| loosely_equal(actual, item)),
        Some("gt") => compare(actual, expected) == Some(Ordering::Greater),
        Some("gte") => matches!(
            compare(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Some("lt") => compare(actual, expected) == Some(Ordering::Less),
        Some("lte") => matches!(
            compare(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Some("like") => match (actual, expected) {
            (Value::String(text), Value::String(pattern)) => text.contains(pattern.as_str()),
            _ => false,
        },
        Some(other) => {
            return Err(AppError::validation(format!("unknown filter operator '{other}'")))
        }
    };
    Ok(matched)
}

fn list(expected: &Value) -> AppResult<&[Value]> {
    match expected {
        Value::Array(items) => Ok(items.as_slice()),
        other => Err(AppError::validation(format!(
            "list operator expects an array, got {}",
            domain::value_kind(other)
        ))),
    }
}

/// Equality where integers and floats of the same magnitude are equal.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Ordering of comparable values: numbers, strings and booleans.
pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Sort rows by `field` (ascending) or `-field` (descending) keys, in order
/// of precedence. Nulls and incomparable values sort first.
pub(crate) fn sort_rows(rows: &mut [Record], keys: &[String]) {
    if keys.is_empty() {
        return;
    }

    rows.sort_by(|a, b| {
        for key in keys {
            let (field, descending) = match key.strip_prefix('-') {
                Some(field) => (field, true),
                None => (key.as_str(), false),
            };

            let left = a.get(field).unwrap_or(&Value::Null);
            let right = b.get(field).unwrap_or(&Value::Null);

            let ordering = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => compare(left, right).unwrap_or(Ordering::Equal),
            };

            let ordering = if descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}
