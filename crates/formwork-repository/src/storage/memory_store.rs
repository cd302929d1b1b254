//! In-memory metadata store for testing and development

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use formwork::{TemplateKey, TemplateRecord};
use uuid::Uuid;

use super::{StoreError, TemplateFilter, TemplateStore};

/// In-memory [`TemplateStore`].
///
/// Version semantics match the SQL adapter exactly: inserts assign the
/// surrogate id and version 1, guarded writes reject stale versions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<TemplateKey, TemplateRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records (useful for testing)
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn find(&self, key: &TemplateKey) -> Result<Option<TemplateRecord>, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        Ok(records.get(key).cloned())
    }

    async fn list(&self, filter: &TemplateFilter) -> Result<Vec<TemplateRecord>, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        let mut matching: Vec<TemplateRecord> = records
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            (&a.document_name, &a.language).cmp(&(&b.document_name, &b.language))
        });
        Ok(matching)
    }

    async fn save(&self, mut record: TemplateRecord) -> Result<TemplateRecord, StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        let key = record.key();
        match records.get(&key) {
            None => {
                if record.id.is_some() {
                    // a previously stored record whose row vanished
                    return Err(StoreError::Missing(key));
                }
                record.id = Some(Uuid::new_v4());
                record.version = 1;
            }
            Some(stored) => {
                if record.id.is_none() {
                    return Err(StoreError::DuplicateKey(key));
                }
                if stored.version != record.version {
                    return Err(StoreError::VersionConflict {
                        key,
                        expected: record.version,
                        stored: stored.version,
                    });
                }
                record.version += 1;
            }
        }
        records.insert(key, record.clone());
        Ok(record)
    }

    async fn delete(&self, key: &TemplateKey, expected_version: u64) -> Result<(), StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        match records.get(key) {
            None => Err(StoreError::Missing(key.clone())),
            Some(stored) if stored.version != expected_version => {
                Err(StoreError::VersionConflict {
                    key: key.clone(),
                    expected: expected_version,
                    stored: stored.version,
                })
            }
            Some(_) => {
                records.remove(key);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formwork::{TemplateBuilder, UserRef};

    fn record(name: &str, language: &str) -> TemplateRecord {
        TemplateBuilder::new(name, language)
            .model("invoice")
            .content(b"bytes".to_vec())
            .author(UserRef::new("author", "Author"))
            .build()
            .unwrap()
            .into_record()
    }

    #[tokio::test]
    async fn insert_assigns_id_and_first_version() {
        let store = MemoryStore::new();
        let saved = store.save(record("test", "en")).await.unwrap();
        assert!(saved.id.is_some());
        assert_eq!(saved.version, 1);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = MemoryStore::new();
        store.save(record("test", "en")).await.unwrap();
        let result = store.save(record("test", "en")).await;
        assert!(matches!(result, Err(StoreError::DuplicateKey(_))));
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let store = MemoryStore::new();
        let saved = store.save(record("test", "en")).await.unwrap();

        let stale = saved.clone();
        store.save(saved).await.unwrap(); // bumps to version 2

        let result = store.save(stale).await;
        assert!(matches!(
            result,
            Err(StoreError::VersionConflict {
                expected: 1,
                stored: 2,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn guarded_delete_rejects_stale_version() {
        let store = MemoryStore::new();
        let saved = store.save(record("test", "en")).await.unwrap();
        let key = saved.key();

        let result = store.delete(&key, saved.version + 1).await;
        assert!(matches!(result, Err(StoreError::VersionConflict { .. })));

        store.delete(&key, saved.version).await.unwrap();
        assert!(store.find(&key).await.unwrap().is_none());
    }
}
