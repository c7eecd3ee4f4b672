//! On-disk metadata store.
//!
//! Layout under the cache directory:
//!
//! ```text
//! descriptions/<game>.json   description text plus provenance
//! covers/<game>.<ext>        image bytes, byte-for-byte as fetched
//! covers/<game>.json         sidecar: provenance, content type, checksum
//! ```
//!
//! Files are written to a temporary name and renamed into place, the cover
//! sidecar last, so a reader never sees a half-written entry.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::MetadataError;
use crate::types::{CacheEntry, MetadataKind, Payload, Source};

const DESCRIPTIONS_DIR: &str = "descriptions";
const COVERS_DIR: &str = "covers";
const IMAGE_EXTS: &[&str] = &["jpg", "png", "webp", "gif"];

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptionFile {
    game: String,
    source: Source,
    fetched_at: DateTime<Utc>,
    sha256: String,
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoverSidecar {
    game: String,
    source: Source,
    fetched_at: DateTime<Utc>,
    content_type: String,
    sha256: String,
}

/// Persistent (game, kind) → entry map.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads an entry. A missing, unreadable or corrupted entry is `None`.
    pub fn load(&self, game: &str, kind: MetadataKind) -> Option<CacheEntry> {
        let result = match kind {
            MetadataKind::Description => self.load_description(game),
            MetadataKind::Cover => self.load_cover(game),
        };
        match result {
            Ok(Some(entry)) if entry.verify() => Some(entry),
            Ok(Some(_)) => {
                warn!(game, %kind, "cached entry failed checksum, ignoring");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(game, %kind, error = %e, "failed to read cached entry");
                None
            }
        }
    }

    fn load_description(&self, game: &str) -> Result<Option<CacheEntry>, MetadataError> {
        let Some(raw) = read_optional(&self.description_path(game))? else {
            return Ok(None);
        };
        let file: DescriptionFile = serde_json::from_slice(&raw)?;
        Ok(Some(CacheEntry {
            game: file.game,
            kind: MetadataKind::Description,
            payload: Payload::Text(file.text),
            source: file.source,
            fetched_at: file.fetched_at,
            sha256: file.sha256,
        }))
    }

    fn load_cover(&self, game: &str) -> Result<Option<CacheEntry>, MetadataError> {
        let Some(raw) = read_optional(&self.cover_sidecar_path(game))? else {
            return Ok(None);
        };
        let sidecar: CoverSidecar = serde_json::from_slice(&raw)?;
        let image_path = self.cover_image_path(game, content_type_to_ext(&sidecar.content_type));
        let Some(bytes) = read_optional(&image_path)? else {
            return Ok(None);
        };
        Ok(Some(CacheEntry {
            game: sidecar.game,
            kind: MetadataKind::Cover,
            payload: Payload::Binary {
                bytes,
                content_type: sidecar.content_type,
            },
            source: sidecar.source,
            fetched_at: sidecar.fetched_at,
            sha256: sidecar.sha256,
        }))
    }

    /// Stores an entry, replacing any previous one for the same key.
    pub fn save(&self, entry: &CacheEntry) -> Result<(), MetadataError> {
        match (&entry.kind, &entry.payload) {
            (MetadataKind::Description, Payload::Text(text)) => {
                let file = DescriptionFile {
                    game: entry.game.clone(),
                    source: entry.source,
                    fetched_at: entry.fetched_at,
                    sha256: entry.sha256.clone(),
                    text: text.clone(),
                };
                write_atomic(
                    &self.description_path(&entry.game),
                    &serde_json::to_vec_pretty(&file)?,
                )?;
            }
            (MetadataKind::Cover, Payload::Binary { bytes, content_type }) => {
                let ext = content_type_to_ext(content_type);
                write_atomic(&self.cover_image_path(&entry.game, ext), bytes)?;
                let sidecar = CoverSidecar {
                    game: entry.game.clone(),
                    source: entry.source,
                    fetched_at: entry.fetched_at,
                    content_type: content_type.clone(),
                    sha256: entry.sha256.clone(),
                };
                write_atomic(
                    &self.cover_sidecar_path(&entry.game),
                    &serde_json::to_vec_pretty(&sidecar)?,
                )?;
                // A previous cover may have had another format.
                for other in IMAGE_EXTS.iter().filter(|e| **e != ext) {
                    remove_optional(&self.cover_image_path(&entry.game, other))?;
                }
            }
            _ => {
                let msg = format!("{} payload does not match its kind", entry.kind);
                return Err(std::io::Error::new(ErrorKind::InvalidInput, msg).into());
            }
        }
        debug!(game = %entry.game, kind = %entry.kind, source = ?entry.source, "cache entry saved");
        Ok(())
    }

    /// Removes one entry.
    pub fn invalidate(&self, game: &str, kind: MetadataKind) -> Result<(), MetadataError> {
        match kind {
            MetadataKind::Description => remove_optional(&self.description_path(game))?,
            MetadataKind::Cover => {
                remove_optional(&self.cover_sidecar_path(game))?;
                for ext in IMAGE_EXTS {
                    remove_optional(&self.cover_image_path(game, ext))?;
                }
            }
        }
        Ok(())
    }

    /// Removes every entry.
    pub fn clear(&self) -> Result<(), MetadataError> {
        for sub in [DESCRIPTIONS_DIR, COVERS_DIR] {
            match std::fs::remove_dir_all(self.dir.join(sub)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Total size of stored files in bytes.
    pub fn size(&self) -> u64 {
        let mut size = 0u64;
        walk_dir(&self.dir, &mut size);
        size
    }

    fn description_path(&self, game: &str) -> PathBuf {
        self.dir
            .join(DESCRIPTIONS_DIR)
            .join(format!("{}.json", file_stem(game)))
    }

    fn cover_sidecar_path(&self, game: &str) -> PathBuf {
        self.dir
            .join(COVERS_DIR)
            .join(format!("{}.json", file_stem(game)))
    }

    fn cover_image_path(&self, game: &str, ext: &str) -> PathBuf {
        self.dir
            .join(COVERS_DIR)
            .join(format!("{}.{ext}", file_stem(game)))
    }
}

/// Maps a game id to a safe file stem.
///
/// Slugs pass through unchanged; anything outside `[A-Za-z0-9_-]` becomes
/// `_`, and ids that had to be changed get a short hash suffix so two
/// different ids never share a file.
pub fn file_stem(game: &str) -> String {
    let clean: String = game
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if clean == game && !clean.is_empty() {
        return clean;
    }
    let hash = crate::types::sha256_hex(game.as_bytes());
    format!("{clean}-{}", &hash[..8])
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, MetadataError> {
    match std::fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn remove_optional(path: &Path) -> Result<(), MetadataError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Writes through a uniquely named temporary file in the same directory,
/// so concurrent writers of one key never share a temporary.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), MetadataError> {
    let parent = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Recursively sums file sizes.
fn walk_dir(dir: &Path, size: &mut u64) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_dir(&path, size);
        } else if let Ok(meta) = entry.metadata() {
            *size += meta.len();
        }
    }
}

/// Maps a content type to a file extension.
fn content_type_to_ext(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, CacheStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::new(tmp.path().join("cache"));
        (tmp, store)
    }

    fn cover(game: &str, bytes: &[u8], content_type: &str) -> CacheEntry {
        CacheEntry::new(
            game,
            MetadataKind::Cover,
            Payload::Binary {
                bytes: bytes.to_vec(),
                content_type: content_type.into(),
            },
            Source::ManifestFallback,
        )
    }

    #[test]
    fn concurrent_saves_of_one_key_all_land() {
        let (_tmp, store) = store();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    store.save(&cover("trine_2", b"\x89PNG\r\n\x1a\ncover", "image/png")).unwrap();
                });
            }
        });

        let loaded = store.load("trine_2", MetadataKind::Cover).unwrap();
        assert!(loaded.verify());
        let leftovers: Vec<_> = std::fs::read_dir(store.dir().join("covers"))
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| !name.starts_with("trine_2."))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn description_roundtrip_keeps_provenance() {
        let (_tmp, store) = store();
        let entry = CacheEntry::new(
            "beneath_a_steel_sky",
            MetadataKind::Description,
            Payload::Text("<p>A classic.</p>".into()),
            Source::Api,
        );
        store.save(&entry).unwrap();
        let loaded = store.load("beneath_a_steel_sky", MetadataKind::Description).unwrap();
        assert_eq!(loaded, entry);
        assert!(store.load("beneath_a_steel_sky", MetadataKind::Cover).is_none());
    }

    #[test]
    fn cover_layout_and_bytes() {
        let (_tmp, store) = store();
        let bytes = b"\x89PNG\r\n\x1a\nfake";
        store.save(&cover("trine_2", bytes, "image/png")).unwrap();
        assert!(store.dir().join("covers/trine_2.png").is_file());
        assert!(store.dir().join("covers/trine_2.json").is_file());

        let loaded = store.load("trine_2", MetadataKind::Cover).unwrap();
        assert_eq!(loaded.payload.as_bytes(), bytes);
        assert_eq!(loaded.payload.content_type(), "image/png");
        assert_eq!(loaded.source, Source::ManifestFallback);
    }

    #[test]
    fn replacing_cover_with_other_format_removes_old_file() {
        let (_tmp, store) = store();
        store.save(&cover("g", b"png", "image/png")).unwrap();
        store.save(&cover("g", b"jpg", "image/jpeg")).unwrap();
        assert!(!store.dir().join("covers/g.png").exists());
        let loaded = store.load("g", MetadataKind::Cover).unwrap();
        assert_eq!(loaded.payload.as_bytes(), b"jpg");
    }

    #[test]
    fn corrupted_entry_is_a_miss() {
        let (_tmp, store) = store();
        store.save(&cover("g", b"original", "image/jpeg")).unwrap();
        std::fs::write(store.dir().join("covers/g.jpg"), b"tampered").unwrap();
        assert!(store.load("g", MetadataKind::Cover).is_none());

        std::fs::write(store.dir().join("covers/g.json"), b"{not json").unwrap();
        assert!(store.load("g", MetadataKind::Cover).is_none());
    }

    #[test]
    fn invalidate_and_clear() {
        let (_tmp, store) = store();
        store.save(&cover("a", b"aaa", "image/png")).unwrap();
        store.save(&cover("b", b"bbb", "image/gif")).unwrap();
        assert!(store.size() > 6);

        store.invalidate("a", MetadataKind::Cover).unwrap();
        assert!(store.load("a", MetadataKind::Cover).is_none());
        assert!(store.load("b", MetadataKind::Cover).is_some());
        // Invalidating a missing entry is fine.
        store.invalidate("a", MetadataKind::Description).unwrap();

        store.clear().unwrap();
        assert_eq!(store.size(), 0);
        store.clear().unwrap();
    }

    #[test]
    fn mismatched_payload_is_rejected() {
        let (_tmp, store) = store();
        let mut entry = cover("g", b"x", "image/png");
        entry.kind = MetadataKind::Description;
        assert!(store.save(&entry).is_err());
    }

    #[test]
    fn file_stems_are_safe_and_distinct() {
        assert_eq!(file_stem("trine_2_complete_story"), "trine_2_complete_story");
        let dotted = file_stem("../etc/passwd");
        assert!(!dotted.contains('/') && !dotted.contains('.'));
        assert_ne!(file_stem("a/b"), file_stem("a_b"));
        assert_ne!(file_stem("a/b"), file_stem("a.b"));
        assert!(!file_stem("").is_empty());
    }
}
