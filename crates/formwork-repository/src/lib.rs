//! # Formwork Repository
//!
//! The template repository and locking engine for formwork:
//! - queries over the versioned template metadata store
//! - exclusive, cooperative edit locks with optimistic-version race
//!   detection
//! - persist/delete coordination between the metadata store and the blob
//!   store, ordered so the two never diverge
//!
//! ## Core Concepts
//!
//! - **Records** live in a transactional metadata store keyed by
//!   (document name, language); the store bumps a version counter on every
//!   committed write and rejects stale writers
//! - **Blobs** hold the raw content bytes and are written only after the
//!   metadata commit for the same update has succeeded
//! - **Locks** are advisory labels on the record; the version counter is
//!   what actually serializes racing editors
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use formwork::{FieldType, ModelDescriptor, ModelRegistry, TemplateBuilder, UserRef};
//! use formwork_repository::{MemoryBlobStorage, MemoryStore, TemplateRepository};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut models = ModelRegistry::new();
//! models.register(ModelDescriptor::new("invoice").field("customer", FieldType::Text));
//!
//! let repository = TemplateRepository::new(Arc::new(MemoryStore::new()), Arc::new(models))
//!     .with_blob_storage(Arc::new(MemoryBlobStorage::new()));
//!
//! let alice = UserRef::new("alice", "Alice");
//! let template = TemplateBuilder::new("invoice", "en")
//!     .model("invoice")
//!     .content(b"...docx bytes...".to_vec())
//!     .author(alice.clone())
//!     .map_field("customer_name", "customer")
//!     .build()?;
//!
//! let template = repository.persist(template).await?;
//! let template = repository.lock_for_edit(template, &alice).await?;
//! let template = repository.unlock(template).await?;
//! repository.delete(template).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod query;
pub mod repository;
pub mod storage;

pub use error::{LockingError, RepositoryError, Result, ValidationError};
pub use query::TemplateQuery;
pub use repository::TemplateRepository;
pub use storage::{
    BlobError, BlobStorage, MemoryBlobStorage, MemoryStore, StoreError, TemplateFilter,
    TemplateStore,
};

#[cfg(feature = "fs")]
pub use storage::fs_storage::FileSystemBlobStorage;

#[cfg(feature = "sqlite")]
pub use storage::sqlite_store::SqliteStore;
