//! Data-model registry and content-mapping validation
//!
//! Templates are bound to a data model by a stable string identifier. The
//! registry maps identifiers to descriptors and is populated once at
//! startup; callers keep passing string ids and the registry answers which
//! fields a model exposes and which models it subsumes. Validation checks
//! that every declared content binding resolves to a model field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TemplateError};
use crate::template::TemplateRecord;

/// Field types a data model exposes to template bindings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Boolean,
    Date,
}

/// One registered data model: its fields and, optionally, the model it
/// specializes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub parent: Option<String>,
    pub fields: BTreeMap<String, FieldType>,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }
}

/// A content binding that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// The offending binding name
    pub field: String,
    pub message: String,
}

/// Startup-populated mapping from model id to descriptor
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelDescriptor>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ModelDescriptor) {
        self.models.insert(descriptor.id.clone(), descriptor);
    }

    pub fn descriptor(&self, model_id: &str) -> Option<&ModelDescriptor> {
        self.models.get(model_id)
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }

    /// True when `model_id` is `expected` or a registered descendant of it.
    pub fn is_compatible(&self, model_id: &str, expected: &str) -> bool {
        let mut current = Some(model_id);
        // hop cap guards against cyclic parent declarations
        let mut hops = self.models.len() + 1;
        while let Some(id) = current {
            if id == expected {
                return true;
            }
            if hops == 0 {
                return false;
            }
            hops -= 1;
            current = self.models.get(id).and_then(|d| d.parent.as_deref());
        }
        false
    }

    /// All bindable fields of a model, including inherited ones. A field
    /// redeclared on a child shadows the parent's declaration.
    pub fn elements(&self, model_id: &str) -> Result<BTreeMap<String, FieldType>> {
        if !self.models.contains_key(model_id) {
            return Err(TemplateError::UnknownModel(model_id.to_string()));
        }
        let mut fields = BTreeMap::new();
        let mut current = Some(model_id);
        let mut hops = self.models.len() + 1;
        while let Some(id) = current {
            let Some(descriptor) = self.models.get(id) else {
                break;
            };
            for (name, field_type) in &descriptor.fields {
                fields.entry(name.clone()).or_insert(*field_type);
            }
            if hops == 0 {
                break;
            }
            hops -= 1;
            current = descriptor.parent.as_deref();
        }
        Ok(fields)
    }

    /// Check a record's declared content mapping against its bound model.
    /// Returns one error per binding that does not resolve to a model
    /// field; never mutates the record.
    pub fn validate_mapping(&self, record: &TemplateRecord) -> Result<Vec<FieldError>> {
        let fields = self.elements(&record.model_id)?;
        let mut errors = Vec::new();
        for (binding, field) in &record.content_mapping {
            if !fields.contains_key(field.as_str()) {
                errors.push(FieldError {
                    field: binding.clone(),
                    message: format!(
                        "binding '{}' refers to '{}', which is not a field of model '{}'",
                        binding, field, record.model_id
                    ),
                });
            }
        }
        Ok(errors)
    }
}
