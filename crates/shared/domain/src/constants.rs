//! Domain-level constants.
//!
//! Separators and reserved keys shared by repositories and adapters.

// =============================================================================
// Records
// =============================================================================

/// Default primary key field of a record kind
pub const DEFAULT_PRIMARY_KEY: &str = "id";

// =============================================================================
// Filters
// =============================================================================

/// Separator between a field and its operator in a filter key (`age__gt`)
pub const FILTER_OPERATOR_SEPARATOR: &str = "__";

// =============================================================================
// Relations
// =============================================================================

/// Separator between segments of an include path (`comments.author`)
pub const INCLUDE_PATH_SEPARATOR: char = '.';

// =============================================================================
// Events
// =============================================================================

/// Separator between the resource and the event name in a topic
pub const TOPIC_SEPARATOR: &str = ":";

/// Metadata key carrying the topic of the event that caused another one
pub const METADATA_CAUSE_KEY: &str = "cause";

/// Split a filter key into its field and optional operator.
///
/// `"age__gt"` gives `("age", Some("gt"))`, `"name"` gives `("name", None)`.
pub fn split_filter_key(key: &str) -> (&str, Option<&str>) {
    match key.split_once(FILTER_OPERATOR_SEPARATOR) {
        Some((field, operator)) => (field, Some(operator)),
        None => (key, None),
    }
}
