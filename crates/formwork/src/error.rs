//! Error types for the formwork domain crate

use thiserror::Error;

/// Errors produced by the domain model itself
#[derive(Error, Debug)]
pub enum TemplateError {
    /// A template could not be constructed from the given parts
    #[error("invalid template: {0}")]
    Invalid(String),

    /// A model identifier does not resolve against the registry
    #[error("unknown data model: {0}")]
    UnknownModel(String),
}

/// Result type for formwork operations
pub type Result<T> = std::result::Result<T, TemplateError>;
