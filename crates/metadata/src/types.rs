//! Cache entry types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which piece of metadata an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetadataKind {
    Description,
    Cover,
}

impl MetadataKind {
    pub fn all() -> &'static [MetadataKind] {
        &[MetadataKind::Description, MetadataKind::Cover]
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataKind::Description => write!(f, "description"),
            MetadataKind::Cover => write!(f, "cover"),
        }
    }
}

/// Where an entry's payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Source {
    Api,
    ManifestFallback,
}

/// Entry content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Description HTML.
    Text(String),
    /// Image bytes, served as-is.
    Binary { bytes: Vec<u8>, content_type: String },
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary { bytes, .. } => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Binary { .. } => None,
        }
    }

    pub fn content_type(&self) -> &str {
        match self {
            Payload::Text(_) => "text/html; charset=utf-8",
            Payload::Binary { content_type, .. } => content_type,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Hex SHA-256 of the payload bytes.
    pub fn sha256(&self) -> String {
        sha256_hex(self.as_bytes())
    }
}

/// One cached piece of metadata for one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub game: String,
    pub kind: MetadataKind,
    pub payload: Payload,
    pub source: Source,
    pub fetched_at: DateTime<Utc>,
    pub sha256: String,
}

impl CacheEntry {
    /// Builds a freshly fetched entry, computing its checksum.
    pub fn new(game: &str, kind: MetadataKind, payload: Payload, source: Source) -> Self {
        let sha256 = payload.sha256();
        Self {
            game: game.to_string(),
            kind,
            payload,
            source,
            fetched_at: Utc::now(),
            sha256,
        }
    }

    /// Whether the stored checksum matches the payload.
    pub fn verify(&self) -> bool {
        self.payload.sha256() == self.sha256
    }
}

/// What a detail view needs; each part is empty when unavailable.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameInfo {
    pub title: String,
    pub description_html: String,
    /// Cover content type, empty without a cover.
    pub cover_content_type: String,
    #[serde(skip)]
    pub cover: Vec<u8>,
    pub description_source: Option<Source>,
    pub cover_source: Option<Source>,
}

impl GameInfo {
    pub fn has_cover(&self) -> bool {
        !self.cover.is_empty()
    }
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_checksum_verifies() {
        let mut entry = CacheEntry::new(
            "trine_2_complete_story",
            MetadataKind::Description,
            Payload::Text("<p>hi</p>".into()),
            Source::Api,
        );
        assert_eq!(entry.sha256.len(), 64);
        assert!(entry.verify());
        entry.payload = Payload::Text("tampered".into());
        assert!(!entry.verify());
    }

    #[test]
    fn payload_accessors() {
        let img = Payload::Binary {
            bytes: vec![1, 2, 3],
            content_type: "image/png".into(),
        };
        assert_eq!(img.len(), 3);
        assert_eq!(img.content_type(), "image/png");
        assert!(img.as_text().is_none());
        assert_eq!(Payload::Text("x".into()).as_text(), Some("x"));
    }

    #[test]
    fn kind_display() {
        assert_eq!(MetadataKind::Cover.to_string(), "cover");
        assert_eq!(MetadataKind::Description.to_string(), "description");
    }
}
