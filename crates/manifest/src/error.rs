//! Manifest error types.

/// Errors produced while reading the manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error at offset {offset}: {msg}")]
    Parse { offset: usize, msg: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
