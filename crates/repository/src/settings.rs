//! Per-repository configuration: names, model, encoders, custom filters and
//! the managed method registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use common::{
    AppError, AppResult, EnglishInflector, Inflector, RepositoryConfig, DEFAULT_CHUNK_SIZE,
    DEFAULT_ITEMS_PER_PAGE, DEFAULT_SERVICE_NAME,
};
use domain::{Record, INCLUDE_PATH_SEPARATOR, TOPIC_SEPARATOR};
use serde_json::Value;

use crate::encoding::{Encoder, EncoderSet};
use crate::record::{RecordDescriptor, RecordKind};
use crate::registry::{EventOptions, MethodRegistry};

/// Named predicate usable as a filter key.
pub type CustomFilter = Arc<dyn Fn(&Record, &Value) -> bool + Send + Sync>;

/// Custom filters keyed by filter name.
pub type CustomFilters = HashMap<String, CustomFilter>;

/// Immutable settings shared by every instance of a repository.
#[derive(Clone)]
pub struct RepositorySettings {
    service: String,
    table: String,
    resource: String,
    model: RecordKind,
    encoders: EncoderSet,
    custom_filters: CustomFilters,
    methods: MethodRegistry,
    inflector: Arc<dyn Inflector>,
    items_per_page: u64,
    chunk_size: u64,
}

impl fmt::Debug for RepositorySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut filters: Vec<&String> = self.custom_filters.keys().collect();
        filters.sort();
        f.debug_struct("RepositorySettings")
            .field("resource", &self.resource)
            .field("table", &self.table)
            .field("model", &self.model.name())
            .field("encoders", &self.encoders)
            .field("custom_filters", &filters)
            .field("methods", &self.methods.len())
            .finish()
    }
}

impl RepositorySettings {
    /// Start configuring a repository over `table`, with the CRUD methods
    /// declared.
    pub fn builder(table: impl Into<String>) -> RepositorySettingsBuilder {
        RepositorySettingsBuilder {
            service: DEFAULT_SERVICE_NAME.to_string(),
            table: table.into(),
            resource: None,
            model: None,
            encoders: EncoderSet::new(),
            custom_filters: HashMap::new(),
            methods: MethodRegistry::with_crud(),
            inflector: Arc::new(EnglishInflector),
            items_per_page: DEFAULT_ITEMS_PER_PAGE,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Builder for a derived repository.
    ///
    /// Encoders, custom filters, declared methods, model, service and page
    /// sizes are all inherited. The resource name is recomputed unless set
    /// again on the builder.
    pub fn derive(&self) -> RepositorySettingsBuilder {
        RepositorySettingsBuilder {
            service: self.service.clone(),
            table: self.table.clone(),
            resource: None,
            model: Some(self.model.clone()),
            encoders: self.encoders.clone(),
            custom_filters: self.custom_filters.clone(),
            methods: self.methods.clone(),
            inflector: self.inflector.clone(),
            items_per_page: self.items_per_page,
            chunk_size: self.chunk_size,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Resource name, `<service>:<singular table>` unless overridden.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn model(&self) -> &RecordKind {
        &self.model
    }

    pub fn encoders(&self) -> &EncoderSet {
        &self.encoders
    }

    pub fn custom_filters(&self) -> &CustomFilters {
        &self.custom_filters
    }

    pub fn methods(&self) -> &MethodRegistry {
        &self.methods
    }

    pub fn inflector(&self) -> &dyn Inflector {
        self.inflector.as_ref()
    }

    pub fn items_per_page(&self) -> u64 {
        self.items_per_page
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }
}

/// Builder for [`RepositorySettings`].
pub struct RepositorySettingsBuilder {
    service: String,
    table: String,
    resource: Option<String>,
    model: Option<RecordKind>,
    encoders: EncoderSet,
    custom_filters: CustomFilters,
    methods: MethodRegistry,
    inflector: Arc<dyn Inflector>,
    items_per_page: u64,
    chunk_size: u64,
}

impl RepositorySettingsBuilder {
    /// Apply service name and page sizes from the environment configuration.
    pub fn config(mut self, config: &RepositoryConfig) -> Self {
        self.service = config.service_name.clone();
        self.items_per_page = config.items_per_page;
        self.chunk_size = config.chunk_size;
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Override the derived resource name.
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn model(mut self, model: RecordKind) -> Self {
        self.model = Some(model);
        self
    }

    pub fn encoder(mut self, field: impl Into<String>, encoder: Arc<dyn Encoder>) -> Self {
        self.encoders.register(field, encoder);
        self
    }

    /// Register a named filter predicate. The filter key `name` then selects
    /// records for which `predicate(record, value)` holds.
    pub fn custom_filter<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Record, &Value) -> bool + Send + Sync + 'static,
    {
        self.custom_filters.insert(name.into(), Arc::new(predicate));
        self
    }

    /// Declare `name` as a query method.
    pub fn query(mut self, name: impl Into<String>) -> Self {
        self.methods.declare_query(name);
        self
    }

    /// Declare `name` as an event method.
    pub fn event(mut self, name: impl Into<String>, options: EventOptions) -> Self {
        self.methods.declare_event(name, options);
        self
    }

    pub fn inflector(mut self, inflector: Arc<dyn Inflector>) -> Self {
        self.inflector = inflector;
        self
    }

    pub fn items_per_page(mut self, items_per_page: u64) -> Self {
        self.items_per_page = items_per_page;
        self
    }

    pub fn chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn build(self) -> AppResult<Arc<RepositorySettings>> {
        if self.table.is_empty() {
            return Err(AppError::configuration("table name must not be empty"));
        }

        let resource = match self.resource {
            Some(resource) => resource,
            None => format!(
                "{}{}{}",
                self.service,
                TOPIC_SEPARATOR,
                self.inflector.singularize(&self.table)
            ),
        };

        if resource.contains(INCLUDE_PATH_SEPARATOR) {
            return Err(AppError::configuration(format!(
                "resource name '{resource}' must not contain '{INCLUDE_PATH_SEPARATOR}'"
            )));
        }

        let model = match self.model {
            Some(model) => model,
            None => RecordDescriptor::new(self.inflector.singularize(&self.table)).build(),
        };

        let items_per_page = self.items_per_page.max(1);
        let chunk_size = self.chunk_size.max(1);

        Ok(Arc::new(RepositorySettings {
            service: self.service,
            table: self.table,
            resource,
            model,
            encoders: self.encoders,
            custom_filters: self.custom_filters,
            methods: self.methods,
            inflector: self.inflector,
            items_per_page,
            chunk_size,
        }))
    }
}
