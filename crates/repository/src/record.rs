//! Record descriptions: name, primary key and relation registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use domain::DEFAULT_PRIMARY_KEY;

use crate::include::Relation;

/// Shared handle to a record description.
pub type RecordKind = Arc<RecordDescriptor>;

/// Describes one kind of record managed by a repository.
pub struct RecordDescriptor {
    name: String,
    primary_key: String,
    relations: HashMap<String, Arc<dyn Relation>>,
}

impl fmt::Debug for RecordDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut relations: Vec<&String> = self.relations.keys().collect();
        relations.sort();
        f.debug_struct("RecordDescriptor")
            .field("name", &self.name)
            .field("primary_key", &self.primary_key)
            .field("relations", &relations)
            .finish()
    }
}

impl RecordDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            relations: HashMap::new(),
        }
    }

    pub fn with_primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = field.into();
        self
    }

    /// Register a relation under `name`.
    pub fn with_relation(mut self, name: impl Into<String>, relation: Arc<dyn Relation>) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    pub fn build(self) -> RecordKind {
        Arc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn relation(&self, name: &str) -> Option<&Arc<dyn Relation>> {
        self.relations.get(name)
    }

    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }
}
