//! Error types for the persist-store crate.

use std::path::PathBuf;

/// Errors raised while loading or flushing a device document.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The device key cannot be used as a file name
    #[error("Invalid storage key {0:?}")]
    InvalidKey(String),

    /// Reading or writing the backing file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing file exists but is not a JSON object
    #[error("Malformed document {key}: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A field could not be converted to or from the requested type
    #[error("Field {field} of {key} has an unexpected shape: {source}")]
    Field {
        key: String,
        field: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
