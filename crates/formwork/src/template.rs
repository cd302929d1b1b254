//! Template records and the detached editing handle

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{Result, TemplateError};
use crate::user::UserRef;

/// Natural key of a template: document name plus language code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemplateKey {
    pub document_name: String,
    pub language: String,
}

impl TemplateKey {
    pub fn new(document_name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            document_name: document_name.into(),
            language: language.into(),
        }
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.document_name, self.language)
    }
}

/// The persisted metadata entity for one (document name, language) template.
///
/// The `version` field is the optimistic-concurrency token: the store
/// increments it on every committed write and rejects writes that present a
/// stale value. `locking_user` is the advisory edit lock; it labels who is
/// editing but the version check is what serializes racing writers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRecord {
    /// Store-assigned surrogate id, set on the first successful save
    pub id: Option<Uuid>,

    pub document_name: String,

    pub language: String,

    /// Raw template content; may be empty until the first upload
    pub content: Vec<u8>,

    /// Registry identifier of the data model this template is bound to
    pub model_id: String,

    /// Declared content bindings: binding name to model field
    pub content_mapping: BTreeMap<String, String>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub edited_at: OffsetDateTime,

    /// Author of the last committed edit
    pub editor: UserRef,

    /// Optimistic-concurrency token, maintained by the store
    pub version: u64,

    /// Owner of the advisory edit lock, if any
    pub locking_user: Option<UserRef>,
}

impl TemplateRecord {
    pub fn key(&self) -> TemplateKey {
        TemplateKey::new(self.document_name.clone(), self.language.clone())
    }

    /// Blob key under which this template's content is stored
    pub fn file_name(&self) -> String {
        format!("{}_{}", self.document_name, self.language)
    }

    pub fn is_locked(&self) -> bool {
        self.locking_user.is_some()
    }

    pub fn is_locked_by(&self, user: &UserRef) -> bool {
        self.locking_user.as_ref() == Some(user)
    }
}

/// A detached editing handle around a [`TemplateRecord`].
///
/// Handles are snapshots carried by a caller session; they are not bound to
/// any commit context. Content edits go through [`Template::update`], which
/// marks the handle changed so the repository knows to re-validate the
/// content mapping before committing. Repository operations consume the
/// handle and hand back a refreshed one wrapping the committed record.
#[derive(Debug, Clone)]
pub struct Template {
    record: TemplateRecord,
    changed: bool,
}

impl Template {
    /// Wrap a stored record in a clean handle.
    pub fn new(record: TemplateRecord) -> Self {
        Self {
            record,
            changed: false,
        }
    }

    /// Swap in a refreshed record while keeping the changed marker, used
    /// when a lock transition commits but the content edit has not.
    pub fn with_record(self, record: TemplateRecord) -> Self {
        Self {
            record,
            changed: self.changed,
        }
    }

    pub fn record(&self) -> &TemplateRecord {
        &self.record
    }

    pub fn into_record(self) -> TemplateRecord {
        self.record
    }

    pub fn key(&self) -> TemplateKey {
        self.record.key()
    }

    /// Whether the content was edited since the handle was created
    pub fn has_changed(&self) -> bool {
        self.changed
    }

    /// Replace the content, stamp the edit time and record the editor.
    pub fn update(&mut self, content: Vec<u8>, editor: UserRef) {
        self.record.content = content;
        self.record.editor = editor;
        self.record.edited_at = OffsetDateTime::now_utc();
        self.changed = true;
    }
}

/// Builder for new templates with a fluent API
#[derive(Debug)]
pub struct TemplateBuilder {
    document_name: String,
    language: String,
    model_id: Option<String>,
    content: Option<Vec<u8>>,
    author: Option<UserRef>,
    content_mapping: BTreeMap<String, String>,
}

impl TemplateBuilder {
    pub fn new(document_name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            document_name: document_name.into(),
            language: language.into(),
            model_id: None,
            content: None,
            author: None,
            content_mapping: BTreeMap::new(),
        }
    }

    /// Bind the template to a registered data model.
    pub fn model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    /// Set the initial content bytes.
    pub fn content(mut self, content: Vec<u8>) -> Self {
        self.content = Some(content);
        self
    }

    /// Set the author, recorded as the first editor.
    pub fn author(mut self, author: UserRef) -> Self {
        self.author = Some(author);
        self
    }

    /// Declare a content binding: `binding` resolves to `field` on the
    /// bound data model.
    pub fn map_field(mut self, binding: impl Into<String>, field: impl Into<String>) -> Self {
        self.content_mapping.insert(binding.into(), field.into());
        self
    }

    /// Build the template handle. The handle starts changed so the first
    /// persist validates the content mapping.
    pub fn build(self) -> Result<Template> {
        if self.document_name.trim().is_empty() {
            return Err(TemplateError::Invalid("document name is required".to_string()));
        }
        if self.language.trim().is_empty() {
            return Err(TemplateError::Invalid("language is required".to_string()));
        }
        let model_id = self
            .model_id
            .ok_or_else(|| TemplateError::Invalid("data model binding is required".to_string()))?;
        let author = self
            .author
            .ok_or_else(|| TemplateError::Invalid("author is required".to_string()))?;

        let now = OffsetDateTime::now_utc();
        let record = TemplateRecord {
            id: None,
            document_name: self.document_name,
            language: self.language,
            content: self.content.unwrap_or_default(),
            model_id,
            content_mapping: self.content_mapping,
            created_at: now,
            edited_at: now,
            editor: author,
            version: 0,
            locking_user: None,
        };
        Ok(Template {
            record,
            changed: true,
        })
    }
}
