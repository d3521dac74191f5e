//! Error types for extraction.
//!
//! Parse problems inside a source are logged and tolerated; only failures to
//! obtain the source at all surface as errors.

use thiserror::Error;

/// Errors that can occur while reading or fetching a Jenkins source.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// XML reader failure.
    #[error("XML error: {0}")]
    XmlError(#[from] quick_xml::Error),

    /// Transport failure talking to the Jenkins server.
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Job path that cannot be turned into a Jenkins URL.
    #[error("invalid job path: {0:?}")]
    InvalidJobPath(String),
}

/// Convenience alias for results with [`ExtractError`].
pub type Result<T> = std::result::Result<T, ExtractError>;
