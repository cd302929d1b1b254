//! Filesystem blob storage
//!
//! Stores one file per blob key under a base directory. Keys derive from
//! template identities (`name_language`), so anything that could escape
//! the base directory is rejected outright.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::blob_storage::{BlobError, BlobStorage};

pub struct FileSystemBlobStorage {
    base_path: PathBuf,
}

impl FileSystemBlobStorage {
    /// Create the storage, making sure the base directory exists.
    pub async fn new(base_path: impl AsRef<Path>) -> Result<Self, BlobError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)
            .await
            .map_err(|e| BlobError::Backend(format!("failed to create {}: {e}", base_path.display())))?;
        Ok(Self { base_path })
    }

    fn blob_path(&self, key: &str) -> Result<PathBuf, BlobError> {
        if key.is_empty() || key.contains('/') || key.contains('\\') || key.contains("..") {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl BlobStorage for FileSystemBlobStorage {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), BlobError> {
        let path = self.blob_path(key)?;
        fs::write(&path, data)
            .await
            .map_err(|e| BlobError::Backend(format!("failed to write {}: {e}", path.display())))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.blob_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(key.to_string()))
            }
            Err(e) => Err(BlobError::Backend(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        let path = self.blob_path(key)?;
        fs::try_exists(&path)
            .await
            .map_err(|e| BlobError::Backend(format!("failed to stat {}: {e}", path.display())))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = self.blob_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobError::Backend(format!(
                "failed to delete {}: {e}",
                path.display()
            ))),
        }
    }
}
