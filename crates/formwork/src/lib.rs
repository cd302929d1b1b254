//! Formwork models versioned document templates: binary content bound to a
//! typed data model through a named content mapping, attributed to editors,
//! and guarded by an optimistic version counter maintained by the backing
//! store.

pub mod error;
pub mod model;
pub mod template;
pub mod user;

// Re-export core types
pub use error::{Result, TemplateError};
pub use model::{FieldError, FieldType, ModelDescriptor, ModelRegistry};
pub use template::{Template, TemplateBuilder, TemplateKey, TemplateRecord};
pub use user::UserRef;

/// Get the library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
