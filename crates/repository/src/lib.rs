//! Event-emitting repository layer.
//!
//! A [`Repository`] wraps a storage [`Adapter`] with:
//! - per-field encoding of attributes, filters and results
//! - relation inclusion through dotted include paths
//! - declared query and event methods; event methods run in a transaction
//!   and publish `<resource>:<event>` after the outermost commit
//! - scoped metadata, causation tracking and event suppression
//!
//! [`MemoryAdapter`] provides an in-process backend.

pub mod adapter;
pub mod bus;
pub mod encoding;
pub mod include;
pub mod memory;
pub mod options;
pub mod pagination;
pub mod record;
pub mod registry;
pub mod repository;
pub mod settings;

mod state;
mod unit_of_work;
mod wrapper;

pub use adapter::{AccessMode, Adapter, Query};
pub use bus::{ChannelPublisher, EventPublisher, Publication, RecordingPublisher};
pub use encoding::{Encoder, EncoderSet, Filtering, FnEncoder, JsonTextEncoder};
pub use include::{check_includes, resolve_includes, CorrelationKey, CorrelationSet, Relation, RelationBatch};
pub use memory::{BelongsTo, HasMany, MemoryAdapter, MemoryTable};
pub use options::{FindOptions, Found, IndexOptions};
pub use pagination::{Listing, Page, PageMeta, PageRequest};
pub use record::{RecordDescriptor, RecordKind};
pub use registry::{EventOptions, ManagedMethod, MethodMode, MethodRegistry};
pub use repository::Repository;
pub use settings::{CustomFilter, CustomFilters, RepositorySettings, RepositorySettingsBuilder};
