//! Shared configuration structures.

use std::env;

use serde::{Deserialize, Serialize};

// =============================================================================
// Defaults
// =============================================================================

/// Service name used as the first segment of resource names
pub const DEFAULT_SERVICE_NAME: &str = "app";

/// Default number of items per page for `index`
pub const DEFAULT_ITEMS_PER_PAGE: u64 = 1_000;

/// Default number of items per page for `chunked_index`
pub const DEFAULT_CHUNK_SIZE: u64 = 50;

/// Default starting page number (1-indexed)
pub const DEFAULT_PAGE_NUMBER: u64 = 1;

/// Capacity of the in-process event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Default log filter
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Repository layer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RepositoryConfig {
    /// Service name, prefix of every resource name
    pub service_name: String,
    /// Page size used by `index` when the caller gives none
    pub items_per_page: u64,
    /// Page size used by `chunked_index` when the caller gives none
    pub chunk_size: u64,
    /// Capacity of the in-process event channel
    pub event_channel_capacity: usize,
    /// Log filter directive
    pub log_level: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            items_per_page: DEFAULT_ITEMS_PER_PAGE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl RepositoryConfig {
    /// Load configuration from environment variables (and `.env`).
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        Self {
            service_name: env::var("SERVICE_NAME").unwrap_or(defaults.service_name),
            items_per_page: parse_var("REPOSITORY_ITEMS_PER_PAGE")
                .unwrap_or(defaults.items_per_page),
            chunk_size: parse_var("REPOSITORY_CHUNK_SIZE").unwrap_or(defaults.chunk_size),
            event_channel_capacity: parse_var("EVENT_CHANNEL_CAPACITY")
                .unwrap_or(defaults.event_channel_capacity),
            log_level: env::var("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}
