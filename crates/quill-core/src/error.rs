//! Domain-level error types.

use std::time::Duration;

use thiserror::Error;

/// Domain errors - business logic failures surfaced to callers.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{entity_type} not found: {key}")]
    NotFound {
        entity_type: &'static str,
        key: String,
    },

    /// A write was rejected because the slug is already taken.
    #[error("A {entity_type} with slug '{slug}' already exists")]
    Conflict {
        entity_type: &'static str,
        slug: String,
    },

    #[error("Forbidden")]
    Forbidden,

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Duration },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(entity_type: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            key: key.into(),
        }
    }

    /// Only transient storage failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }

    /// Classify a storage failure for the entity being addressed.
    pub fn from_store(err: StoreError, entity_type: &'static str, key: &str) -> Self {
        match err {
            StoreError::NotFound => Self::not_found(entity_type, key),
            StoreError::Conflict(_) => Self::Conflict {
                entity_type,
                slug: key.to_string(),
            },
            StoreError::AccessDenied(_) => Self::Forbidden,
            StoreError::Unavailable(msg) => Self::StorageUnavailable(msg),
            StoreError::Serialization(msg) | StoreError::Backend(msg) => Self::Internal(msg),
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        Self::from_store(err, "document", "")
    }
}

/// Storage-level errors reported by document store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document not found")]
    NotFound,

    #[error("Document already exists: {0}")]
    Conflict(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
