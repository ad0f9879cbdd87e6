//! File-backed persistence for the three JSON documents.
//!
//! The store is the IPC channel between the external job and any observer:
//! the job writes `status.json` / `progress.json`, we only read them.
//! Loading never fails. A missing or malformed file (including one caught
//! mid-write) reads as `None`.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::core::models::Document;
use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of<D: Document>(&self) -> PathBuf {
        self.dir.join(D::FILE_NAME)
    }

    /// Read a document, collapsing absence and corruption into `None`.
    pub fn load<D: Document>(&self) -> Option<D> {
        let path = self.path_of::<D>();

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Document unreadable");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(doc) => Some(doc),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Document malformed, treating as absent");
                None
            }
        }
    }

    /// Last modification time of a document, if it exists.
    pub fn modified<D: Document>(&self) -> Option<SystemTime> {
        fs::metadata(self.path_of::<D>())
            .and_then(|meta| meta.modified())
            .ok()
    }

    /// Replace a document in full.
    ///
    /// Writes to a sibling temp file and renames it over the target so a
    /// concurrent reader sees either the old or the new document.
    pub fn save<D: Document>(&self, doc: &D) -> Result<(), StoreError> {
        let path = self.path_of::<D>();
        let mut content =
            serde_json::to_vec_pretty(doc).map_err(|source| StoreError::Serialize {
                path: path.clone(),
                source,
            })?;
        content.push(b'\n');

        write_atomic(&path, &content)
    }

    /// Remove a document. A document that is already gone is not an error.
    pub fn clear<D: Document>(&self) -> Result<(), StoreError> {
        let path = self.path_of::<D>();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Write { path, source }),
        }
    }
}

/// Write `content` to `path` via temp file + rename, creating parent dirs.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()
    };

    if let Err(source) = write() {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::Write {
            path: tmp_path,
            source,
        });
    }

    fs::rename(&tmp_path, path).map_err(|source| {
        warn!(path = %path.display(), error = %source, "Atomic rename failed");
        let _ = fs::remove_file(&tmp_path);
        StoreError::Rename {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{BackupConfig, BackupProgress, BackupStatus, Phase};
    use tempfile::tempdir;

    #[test]
    fn test_load_missing_returns_none() {
        let temp = tempdir().unwrap();
        let store = StateStore::new(temp.path());
        assert!(store.load::<BackupStatus>().is_none());
        assert!(store.load::<BackupProgress>().is_none());
    }

    #[test]
    fn test_load_invalid_json_returns_none() {
        let temp = tempdir().unwrap();
        let store = StateStore::new(temp.path());

        fs::write(store.path_of::<BackupProgress>(), b"{\"phase\":\"sync\",\"perc").unwrap();
        assert!(store.load::<BackupProgress>().is_none());

        fs::write(store.path_of::<BackupStatus>(), b"not json at all").unwrap();
        assert!(store.load::<BackupStatus>().is_none());

        fs::write(store.path_of::<BackupConfig>(), b"").unwrap();
        assert!(store.load::<BackupConfig>().is_none());
    }

    #[test]
    fn test_save_replaces_whole_document() {
        let temp = tempdir().unwrap();
        let store = StateStore::new(temp.path().join("nested"));

        let mut config = BackupConfig::with_defaults();
        config.days = vec![2];
        store.save(&config).unwrap();

        config.days.clear();
        config.destination = "/Volumes/Other/".to_string();
        store.save(&config).unwrap();

        assert_eq!(store.load::<BackupConfig>(), Some(config));
        // No temp file left behind
        let leftovers: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let temp = tempdir().unwrap();
        let store = StateStore::new(temp.path());

        store
            .save(&BackupProgress {
                phase: Phase::Done,
                percent: 100,
                current: 4,
                total: 4,
            })
            .unwrap();
        store.clear::<BackupProgress>().unwrap();
        assert!(store.load::<BackupProgress>().is_none());
        store.clear::<BackupProgress>().unwrap();
    }

    #[test]
    fn test_modified_tracks_presence() {
        let temp = tempdir().unwrap();
        let store = StateStore::new(temp.path());
        assert!(store.modified::<BackupStatus>().is_none());

        fs::write(store.path_of::<BackupStatus>(), b"{}").unwrap();
        assert!(store.modified::<BackupStatus>().is_some());
    }
}
