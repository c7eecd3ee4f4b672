//! Metadata error types.

use std::sync::Arc;

use gogrepo_manifest::ManifestError;

use crate::types::MetadataKind;

/// Errors from metadata resolution.
///
/// Cloneable so every caller coalesced onto one resolution receives the
/// same result.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MetadataError {
    #[error("no {kind} available for {game}")]
    NotFound { game: String, kind: MetadataKind },

    /// Any failure talking to the products API; only ever triggers the
    /// manifest fallback.
    #[error("API unavailable: {0}")]
    ApiUnavailable(String),

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),

    #[error("manifest error: {0}")]
    Manifest(Arc<ManifestError>),
}

impl From<std::io::Error> for MetadataError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for MetadataError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(Arc::new(e))
    }
}

impl From<ManifestError> for MetadataError {
    fn from(e: ManifestError) -> Self {
        Self::Manifest(Arc::new(e))
    }
}

impl MetadataError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
