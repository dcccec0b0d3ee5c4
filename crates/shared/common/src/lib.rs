//! Common utilities shared across the workspace.
//!
//! This crate provides:
//! - Unified error handling for repositories and adapters
//! - Configuration structures
//! - English inflection for event and resource names

pub mod config;
pub mod error;
pub mod inflect;

pub use config::*;
pub use error::{AppError, AppResult, OptionExt};
pub use inflect::{EnglishInflector, Inflector};
