//! Template repository façade and locking engine
//!
//! The repository is the only component that commits record mutations and
//! the only writer of the blob store. Per record, racing commits are
//! serialized by the store's optimistic-version guard; the advisory
//! `locking_user` on a record is the user-facing ownership label layered
//! on top of it. Blob writes happen strictly after the metadata commit for
//! the same update, so a failed commit never leaves an orphaned or
//! inconsistent blob.

use std::sync::Arc;

use tracing::debug;

use formwork::{ModelRegistry, Template, TemplateKey, UserRef};

use crate::error::{LockingError, RepositoryError, Result, ValidationError};
use crate::query::TemplateQuery;
use crate::storage::{BlobStorage, TemplateStore};

pub struct TemplateRepository {
    store: Arc<dyn TemplateStore>,
    models: Arc<ModelRegistry>,
    blobs: Option<Arc<dyn BlobStorage>>,
}

impl TemplateRepository {
    /// Create a repository over the given metadata store and model
    /// registry, without a blob store.
    pub fn new(store: Arc<dyn TemplateStore>, models: Arc<ModelRegistry>) -> Self {
        Self {
            store,
            models,
            blobs: None,
        }
    }

    /// Attach a blob store. Content bytes are then mirrored there after
    /// every committed metadata write.
    pub fn with_blob_storage(mut self, blobs: Arc<dyn BlobStorage>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Fresh query over all templates.
    pub fn query_templates(&self) -> TemplateQuery {
        TemplateQuery::new(Arc::clone(&self.store))
    }

    /// Point lookup by natural key; an absent template is `None`, not an
    /// error.
    pub async fn get_template(
        &self,
        document_name: &str,
        language: &str,
    ) -> Result<Option<Template>> {
        let key = TemplateKey::new(document_name, language);
        let record = self
            .store
            .find(&key)
            .await
            .map_err(RepositoryError::from_store)?;
        Ok(record.map(Template::new))
    }

    /// Typed lookup: as [`get_template`], but additionally requires the
    /// stored template to be bound to `expected_model` or a registered
    /// descendant of it.
    ///
    /// [`get_template`]: TemplateRepository::get_template
    pub async fn get_template_as(
        &self,
        document_name: &str,
        language: &str,
        expected_model: &str,
    ) -> Result<Option<Template>> {
        let Some(template) = self.get_template(document_name, language).await? else {
            return Ok(None);
        };
        let actual = &template.record().model_id;
        if !self.models.is_compatible(actual, expected_model) {
            return Err(RepositoryError::ModelMismatch {
                key: template.key(),
                expected: expected_model.to_string(),
                actual: actual.clone(),
            });
        }
        Ok(Some(template))
    }

    /// Acquire the exclusive edit lock for `user`.
    ///
    /// Re-locking by the current owner is an idempotent no-op. A lock held
    /// by anyone else fails with [`LockingError::LockedBy`] and leaves the
    /// stored record untouched. Two sessions racing from the same observed
    /// unlocked state are decided by the version guard: exactly one commit
    /// wins, the loser gets [`LockingError::VersionConflict`].
    pub async fn lock_for_edit(&self, template: Template, user: &UserRef) -> Result<Template> {
        match template.record().locking_user.as_ref() {
            Some(owner) if owner == user => return Ok(template),
            Some(owner) => {
                return Err(LockingError::LockedBy {
                    key: template.key(),
                    user: owner.clone(),
                }
                .into());
            }
            None => {}
        }

        let mut record = template.record().clone();
        record.locking_user = Some(user.clone());
        let saved = self
            .store
            .save(record)
            .await
            .map_err(RepositoryError::from_store)?;
        debug!(template = %saved.key(), user = %user.id, "template locked");
        Ok(template.with_record(saved))
    }

    /// Release the lock, regardless of who holds it (administrative unlock
    /// is allowed), and commit. Releasing an unlocked template is a
    /// harmless write.
    pub async fn unlock(&self, template: Template) -> Result<Template> {
        let mut record = template.record().clone();
        record.locking_user = None;
        let saved = self
            .store
            .save(record)
            .await
            .map_err(RepositoryError::from_store)?;
        debug!(template = %saved.key(), "template unlocked");
        Ok(template.with_record(saved))
    }

    /// Commit the handle's state.
    ///
    /// Changed content is validated against the bound model first; a
    /// validation failure writes nothing. The metadata commit is guarded
    /// by the handle's version — a conflict surfaces as
    /// [`LockingError::VersionConflict`] and skips the blob entirely, as
    /// does any other store failure. Only a confirmed metadata commit is
    /// followed by the blob write.
    pub async fn persist(&self, template: Template) -> Result<Template> {
        if template.has_changed() {
            let errors = self.models.validate_mapping(template.record())?;
            if !errors.is_empty() {
                return Err(ValidationError { errors }.into());
            }
        }

        let saved = self
            .store
            .save(template.into_record())
            .await
            .map_err(RepositoryError::from_store)?;

        if let Some(blobs) = &self.blobs {
            blobs.put(&saved.file_name(), saved.content.clone()).await?;
        }
        debug!(template = %saved.key(), version = saved.version, "template persisted");
        Ok(Template::new(saved))
    }

    /// Remove the record and, afterwards, its blob.
    ///
    /// Refused with [`LockingError::LockedBy`] while any lock is held.
    /// The metadata delete comes first, so a metadata failure never
    /// triggers a blob delete; a blob failure after the committed
    /// metadata delete propagates without undoing it.
    pub async fn delete(&self, template: Template) -> Result<()> {
        let record = template.record();
        if let Some(owner) = record.locking_user.as_ref() {
            return Err(LockingError::LockedBy {
                key: record.key(),
                user: owner.clone(),
            }
            .into());
        }

        let key = record.key();
        self.store
            .delete(&key, record.version)
            .await
            .map_err(RepositoryError::from_store)?;

        if let Some(blobs) = &self.blobs {
            blobs.delete(&record.file_name()).await?;
        }
        debug!(template = %key, "template deleted");
        Ok(())
    }
}
