//! Unified error handling for repositories and adapters.
//!
//! Provides a single error type shared by the repository engine, storage
//! adapters and callers. Fatal integration defects (unimplemented hooks,
//! invalid creation results, unknown relations) are ordinary variants so
//! that the scoped state of a repository is unwound before they surface.

use domain::DomainError;
use thiserror::Error;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    // Authorization
    #[error("Access denied: {0}")]
    Forbidden(String),

    // Resource errors
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("{0} already exists")]
    Conflict(String),

    // Validation
    #[error("{0}")]
    Validation(String),

    // Integration defects
    #[error("please implement {0}")]
    Unimplemented(&'static str),

    #[error("creation must return the String or Integer id of the new record, but {0} given")]
    InvalidCreationResult(String),

    #[error("Relation not found: {relation} on {record}")]
    UnknownRelation { record: String, relation: String },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    // Storage
    #[error("Storage error: {0}")]
    Storage(String),

    // Internal
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get a stable machine readable error code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::RecordNotFound(_) => "RECORD_NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Unimplemented(_) => "NOT_IMPLEMENTED",
            AppError::InvalidCreationResult(_) => "INVALID_CREATION_RESULT",
            AppError::UnknownRelation { .. } => "UNKNOWN_RELATION",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this error signals an integration defect rather than a
    /// runtime condition a caller could handle.
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            AppError::Unimplemented(_)
                | AppError::InvalidCreationResult(_)
                | AppError::UnknownRelation { .. }
                | AppError::Configuration(_)
        )
    }
}

// =============================================================================
// Domain Error Conversion
// =============================================================================

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => AppError::Validation(msg),
            DomainError::NotFound(msg) => AppError::RecordNotFound(msg),
            DomainError::Conflict(msg) => AppError::Conflict(msg),
            DomainError::Forbidden(msg) => AppError::Forbidden(msg),
            DomainError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;

/// Extension trait for Option -> AppError conversion
pub trait OptionExt<T> {
    fn ok_or_not_found(self, what: impl Into<String>) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, what: impl Into<String>) -> AppResult<T> {
        self.ok_or_else(|| AppError::RecordNotFound(what.into()))
    }
}

/// Convenience constructors
impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::RecordNotFound(what.into())
    }

    pub fn conflict(entity: impl Into<String>) -> Self {
        AppError::Conflict(entity.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::Configuration(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        AppError::Storage(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    pub fn unknown_relation(record: impl Into<String>, relation: impl Into<String>) -> Self {
        AppError::UnknownRelation {
            record: record.into(),
            relation: relation.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_app_errors() {
        let err: AppError = DomainError::forbidden("delete on blog:post").into();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(err.code(), "FORBIDDEN");

        let err: AppError = DomainError::not_found("post 3").into();
        assert!(matches!(err, AppError::RecordNotFound(_)));
    }

    #[test]
    fn defects_are_flagged() {
        assert!(AppError::Unimplemented("create_impl").is_defect());
        assert!(AppError::unknown_relation("PostRecord", "tags").is_defect());
        assert!(!AppError::not_found("1").is_defect());
    }

    #[test]
    fn option_ext_builds_not_found() {
        let missing: Option<u32> = None;
        let err = missing.ok_or_not_found("{\"id\":3}").unwrap_err();
        assert_eq!(err.to_string(), "Record not found: {\"id\":3}");
    }
}
