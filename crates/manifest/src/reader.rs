//! Lazily loaded, mtime-checked manifest file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::error::ManifestError;
use crate::manifest::{GameRecord, GameSummary, Manifest};

struct Cached {
    modified: SystemTime,
    len: u64,
    manifest: Arc<Manifest>,
}

/// Reads the manifest on first use and again whenever the file changes.
///
/// gogrepo rewrites the manifest at the end of every `update`, so callers
/// always see the latest one without restarting.
pub struct ManifestReader {
    path: PathBuf,
    cached: Mutex<Option<Cached>>,
}

impl ManifestReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the manifest file exists.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Returns the current manifest, re-reading the file if it changed.
    pub fn load(&self) -> Result<Arc<Manifest>, ManifestError> {
        let meta = std::fs::metadata(&self.path)?;
        let modified = meta.modified()?;
        let len = meta.len();

        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(c) = cached.as_ref()
            && c.modified == modified
            && c.len == len
        {
            return Ok(Arc::clone(&c.manifest));
        }

        let bytes = std::fs::read(&self.path)?;
        let text = String::from_utf8_lossy(&bytes);
        let manifest = Arc::new(Manifest::parse(&text)?);
        debug!(path = %self.path.display(), games = manifest.len(), "manifest loaded");
        *cached = Some(Cached {
            modified,
            len,
            manifest: Arc::clone(&manifest),
        });
        Ok(manifest)
    }

    /// Game list; empty if the manifest is missing or unreadable.
    pub fn games(&self) -> Vec<GameSummary> {
        match self.load() {
            Ok(manifest) => manifest.games(),
            Err(ManifestError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read manifest");
                Vec::new()
            }
        }
    }

    /// Looks up one game by title slug. A missing manifest is `Ok(None)`.
    pub fn find(&self, title: &str) -> Result<Option<GameRecord>, ManifestError> {
        match self.load() {
            Ok(manifest) => Ok(manifest.find(title).cloned()),
            Err(ManifestError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}
