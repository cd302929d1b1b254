//! Storage abstraction for template metadata and content blobs
//!
//! Two independent stores back the repository: the transactional
//! [`TemplateStore`] holding versioned metadata records, and the
//! [`BlobStorage`] holding raw content bytes. The repository is the only
//! component that writes to either, and always metadata first.

use async_trait::async_trait;
use formwork::{TemplateKey, TemplateRecord};
use thiserror::Error;

pub mod blob_storage;
pub mod memory_store;

#[cfg(feature = "fs")]
pub mod fs_storage;

#[cfg(feature = "sqlite")]
pub mod sqlite_store;

pub use blob_storage::{BlobError, BlobStorage, MemoryBlobStorage};
pub use memory_store::MemoryStore;

/// Errors surfaced by the transactional metadata store
#[derive(Debug, Error)]
pub enum StoreError {
    /// A guarded write presented a stale version
    #[error("version conflict on template {key}: expected {expected}, stored {stored}")]
    VersionConflict {
        key: TemplateKey,
        expected: u64,
        stored: u64,
    },

    /// An insert collided with an existing natural key
    #[error("template {0} already exists")]
    DuplicateKey(TemplateKey),

    /// A guarded write targeted a record that no longer exists
    #[error("template {0} does not exist")]
    Missing(TemplateKey),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Filters a query pushes down into the store
#[derive(Debug, Clone, Default)]
pub struct TemplateFilter {
    pub document_name: Option<String>,
    pub language: Option<String>,
}

impl TemplateFilter {
    fn matches(&self, record: &TemplateRecord) -> bool {
        if let Some(name) = &self.document_name {
            if &record.document_name != name {
                return false;
            }
        }
        if let Some(language) = &self.language {
            if &record.language != language {
                return false;
            }
        }
        true
    }
}

/// Transactional, versioned metadata store for template records.
///
/// `save` uses the record's own `version` as the optimistic guard: an
/// update commits only while the stored version still matches, and the
/// committed record comes back carrying the version the store assigned.
/// Records without a surrogate id are inserts; the store assigns the id
/// and version 1. Reads are consistent with the store's own writes.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Point lookup by natural key
    async fn find(&self, key: &TemplateKey) -> Result<Option<TemplateRecord>, StoreError>;

    /// All records matching the filter, ordered by document name, then
    /// language
    async fn list(&self, filter: &TemplateFilter) -> Result<Vec<TemplateRecord>, StoreError>;

    /// Insert or update, guarded by `record.version`
    async fn save(&self, record: TemplateRecord) -> Result<TemplateRecord, StoreError>;

    /// Remove, guarded by `expected_version`
    async fn delete(&self, key: &TemplateKey, expected_version: u64) -> Result<(), StoreError>;
}
