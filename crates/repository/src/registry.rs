//! Declarative method registry.
//!
//! Repositories declare which of their operations are read-only queries and
//! which are mutations that emit events. [`Repository::call`] consults the
//! registry to route an invocation through the matching wrapper; an
//! undeclared name runs unwrapped.
//!
//! [`Repository::call`]: crate::repository::Repository::call

use std::collections::HashMap;
use std::sync::Arc;

use common::Inflector;

// =============================================================================
// Built-in operations
// =============================================================================

pub const METHOD_CREATE: &str = "create";
pub const METHOD_UPDATE: &str = "update";
pub const METHOD_DELETE: &str = "delete";
pub const METHOD_INDEX: &str = "index";

/// How a managed method is wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodMode {
    /// Read-only: read access mode, no transaction, no event
    Query,
    /// Mutation: read-write access mode, transaction, event after commit
    Event,
}

/// Options of an event declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventOptions {
    /// Explicit event name; derived from the method name when absent
    pub name: Option<String>,
    /// The method creates a record and returns its identifier
    pub creation: bool,
    /// Position of the record identifier among the call arguments
    pub key: usize,
}

impl EventOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn creation(mut self) -> Self {
        self.creation = true;
        self
    }

    pub fn key(mut self, key: usize) -> Self {
        self.key = key;
        self
    }
}

/// Descriptor of a declared method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedMethod {
    name: String,
    mode: MethodMode,
    options: EventOptions,
}

impl ManagedMethod {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> MethodMode {
        self.mode
    }

    pub fn is_creation(&self) -> bool {
        self.options.creation
    }

    pub fn key(&self) -> usize {
        self.options.key
    }

    /// Explicit event name, or the past tense of the method name.
    pub fn event_name(&self, inflector: &dyn Inflector) -> String {
        match &self.options.name {
            Some(name) => name.clone(),
            None => inflector.past(&self.name),
        }
    }
}

/// Managed methods of one repository, at most one per name.
#[derive(Debug, Clone, Default)]
pub struct MethodRegistry {
    methods: HashMap<String, Arc<ManagedMethod>>,
}

impl MethodRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the CRUD operations declared.
    pub fn with_crud() -> Self {
        let mut registry = Self::new();
        registry.declare_event(METHOD_UPDATE, EventOptions::default());
        registry.declare_event(METHOD_CREATE, EventOptions::named("created").creation());
        registry.declare_event(METHOD_DELETE, EventOptions::named("deleted"));
        registry.declare_query(METHOD_INDEX);
        registry
    }

    /// Declare a query method. Returns `false` if `name` was already managed.
    pub fn declare_query(&mut self, name: impl Into<String>) -> bool {
        self.declare(name.into(), MethodMode::Query, EventOptions::default())
    }

    /// Declare an event method. Returns `false` if `name` was already managed.
    pub fn declare_event(&mut self, name: impl Into<String>, options: EventOptions) -> bool {
        self.declare(name.into(), MethodMode::Event, options)
    }

    fn declare(&mut self, name: String, mode: MethodMode, options: EventOptions) -> bool {
        if self.methods.contains_key(&name) {
            return false;
        }

        let method = ManagedMethod {
            name: name.clone(),
            mode,
            options,
        };
        self.methods.insert(name, Arc::new(method));
        true
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ManagedMethod>> {
        self.methods.get(name)
    }

    pub fn is_managed(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::EnglishInflector;

    #[test]
    fn crud_methods_are_declared() {
        let registry = MethodRegistry::with_crud();

        let create = registry.get(METHOD_CREATE).unwrap();
        assert_eq!(create.mode(), MethodMode::Event);
        assert!(create.is_creation());
        assert_eq!(create.event_name(&EnglishInflector), "created");

        let update = registry.get(METHOD_UPDATE).unwrap();
        assert!(!update.is_creation());
        assert_eq!(update.key(), 0);
        assert_eq!(update.event_name(&EnglishInflector), "updated");

        assert_eq!(registry.get(METHOD_INDEX).unwrap().mode(), MethodMode::Query);
        assert!(registry.get("find_by").is_none());
    }

    #[test]
    fn redeclaration_is_a_no_op() {
        let mut registry = MethodRegistry::new();

        assert!(registry.declare_event("archive", EventOptions::default()));
        assert!(!registry.declare_query("archive"));
        assert!(!registry.declare_event("archive", EventOptions::named("shelved")));

        let archive = registry.get("archive").unwrap();
        assert_eq!(archive.mode(), MethodMode::Event);
        assert_eq!(archive.event_name(&EnglishInflector), "archived");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn explicit_names_take_precedence() {
        let mut registry = MethodRegistry::new();
        registry.declare_event("publish", EventOptions::named("went_live").key(1));

        let publish = registry.get("publish").unwrap();
        assert_eq!(publish.event_name(&EnglishInflector), "went_live");
        assert_eq!(publish.key(), 1);
    }
}
