//! Error types for emitter operations.
//!
//! Configuration and template failures are fatal to the emitter that needed
//! them; everything else degrades inside the emitters and is only logged.

use thiserror::Error;

/// Errors that can occur while emitting CodeArts documents.
#[derive(Debug, Error)]
pub enum EmitError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// No template with this name exists in the store.
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// A template parsed but does not have the expected shape.
    #[error("invalid template {name}: {reason}")]
    InvalidTemplate { name: String, reason: String },
}

/// Convenience alias for results with [`EmitError`].
pub type Result<T> = std::result::Result<T, EmitError>;
