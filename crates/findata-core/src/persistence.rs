//! Optional on-disk snapshots of the cache.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::cache::CacheSnapshot;
use crate::PersistenceError;

/// Backend that can load and save a whole-cache snapshot.
pub trait CachePersistence: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<CacheSnapshot>, PersistenceError>;

    fn save(&self, snapshot: &CacheSnapshot) -> Result<(), PersistenceError>;
}

/// Snapshot stored as one JSON document.
///
/// Saves write a sibling temporary file and rename it over the target, so
/// a reader never sees a half-written snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    path: PathBuf,
}

impl JsonFileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl CachePersistence for JsonFileCache {
    fn load(&self) -> Result<Option<CacheSnapshot>, PersistenceError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no cache snapshot on disk");
                return Ok(None);
            }
            Err(error) => return Err(self.io_error(error)),
        };

        let snapshot: CacheSnapshot = serde_json::from_str(&raw)?;
        if snapshot.version != CacheSnapshot::VERSION {
            return Err(PersistenceError::Version {
                found: snapshot.version,
                expected: CacheSnapshot::VERSION,
            });
        }
        info!(
            path = %self.path.display(),
            entries = snapshot.entries.len(),
            "loaded cache snapshot"
        );
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &CacheSnapshot) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let body = serde_json::to_vec_pretty(snapshot)?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, body).map_err(|e| self.io_error(e))?;
        fs::rename(&staging, &self.path).map_err(|e| self.io_error(e))?;

        debug!(
            path = %self.path.display(),
            entries = snapshot.entries.len(),
            "saved cache snapshot"
        );
        Ok(())
    }
}
