//! Error types for the template repository

use formwork::{FieldError, TemplateError, TemplateKey, UserRef};
use thiserror::Error;

use crate::storage::{BlobError, StoreError};

/// Lock or concurrent-write conflicts.
///
/// Always safe to retry after re-fetching the current template.
#[derive(Debug, Error)]
pub enum LockingError {
    /// Another editor holds the advisory edit lock
    #[error("template {key} is locked by {user}")]
    LockedBy { key: TemplateKey, user: UserRef },

    /// The optimistic-version guard rejected the commit
    #[error("template {key} was modified concurrently (version {expected} is stale)")]
    VersionConflict { key: TemplateKey, expected: u64 },
}

/// Content-mapping validation failure, one entry per offending binding.
///
/// Raised by persist before any write happens.
#[derive(Debug, Error)]
#[error("template content failed validation: {} unresolved binding(s)", .errors.len())]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

/// Repository-level errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Locking(#[from] LockingError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Typed lookup found a template bound to an incompatible model
    #[error("template {key} is bound to model '{actual}', expected '{expected}'")]
    ModelMismatch {
        key: TemplateKey,
        expected: String,
        actual: String,
    },

    /// The record names a model the registry does not know
    #[error("unknown data model: {0}")]
    UnknownModel(String),

    /// Domain-level rejection of a template handle
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    /// Unclassified metadata-store failure, propagated unchanged
    #[error(transparent)]
    Store(StoreError),

    /// Blob-store failure; on persist/delete paths this can only happen
    /// after the metadata commit already succeeded
    #[error("blob storage error: {0}")]
    Blob(#[from] BlobError),
}

impl RepositoryError {
    /// Map a store failure from a version-guarded write: guard rejections
    /// are locking conflicts, everything else propagates unchanged.
    pub(crate) fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { key, expected, .. } => {
                Self::Locking(LockingError::VersionConflict { key, expected })
            }
            other => Self::Store(other),
        }
    }
}

impl From<TemplateError> for RepositoryError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::UnknownModel(id) => Self::UnknownModel(id),
            TemplateError::Invalid(reason) => Self::InvalidTemplate(reason),
        }
    }
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepositoryError>;
