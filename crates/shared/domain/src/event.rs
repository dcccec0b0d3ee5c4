//! Event payload published after a mutation commits.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::Metadata;

/// Body of a domain event.
///
/// `resource_id` is always the string form of the record identifier;
/// `args` are the call arguments (without the identifier for mutations).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub resource_id: String,
    pub args: Vec<Value>,
    pub metadata: Metadata,
}

impl EventPayload {
    pub fn new(resource_id: impl Into<String>, args: Vec<Value>, metadata: Metadata) -> Self {
        Self {
            resource_id: resource_id.into(),
            args,
            metadata,
        }
    }

    /// Topic of the event that caused this one, if any.
    pub fn cause(&self) -> Option<&str> {
        self.metadata
            .get(crate::constants::METADATA_CAUSE_KEY)
            .and_then(Value::as_str)
    }
}
