//! Blob storage for template content
//!
//! Template content bytes live outside the transactional metadata store.
//! The repository writes a blob only after the metadata commit for the
//! same update has succeeded, so a given key never has more than one
//! writer per logical update.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("invalid blob key: {0}")]
    InvalidKey(String),

    #[error("blob backend error: {0}")]
    Backend(String),
}

/// Abstraction for blob storage backends.
///
/// `put` replaces any prior blob at the key; `delete` of an absent key is
/// not an error. Both are safe for a caller to retry.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Store data at the given key, replacing any prior blob
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), BlobError>;

    /// Retrieve data by key
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError>;

    /// Check if key exists
    async fn exists(&self, key: &str) -> Result<bool, BlobError>;

    /// Delete data by key
    async fn delete(&self, key: &str) -> Result<(), BlobError>;
}

/// In-memory blob storage for testing
#[derive(Debug, Default)]
pub struct MemoryBlobStorage {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all stored keys (useful for testing)
    pub fn keys(&self) -> Vec<String> {
        self.data.lock().unwrap().keys().cloned().collect()
    }

    /// Get number of stored blobs
    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    /// Check if storage is empty
    pub fn is_empty(&self) -> bool {
        self.data.lock().unwrap().is_empty()
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        self.data.lock().unwrap().clear();
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), BlobError> {
        let mut blobs = self
            .data
            .lock()
            .map_err(|_| BlobError::Backend("lock poisoned".into()))?;
        blobs.insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let blobs = self
            .data
            .lock()
            .map_err(|_| BlobError::Backend("lock poisoned".into()))?;
        blobs
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        let blobs = self
            .data
            .lock()
            .map_err(|_| BlobError::Backend("lock poisoned".into()))?;
        Ok(blobs.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let mut blobs = self
            .data
            .lock()
            .map_err(|_| BlobError::Backend("lock poisoned".into()))?;
        blobs.remove(key);
        Ok(())
    }
}
