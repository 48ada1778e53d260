//! Durable per-VPC state store.
//!
//! One JSON file per VPC under the state directory, written atomically
//! (temp file in the same directory, fsync, rename over the target). The
//! reconciler writes a record only after the kernel steps it describes
//! have succeeded, so a record on disk always names objects that existed
//! at its last write.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::VpcRecord;

/// Errors from the state store. All of them are fatal to the operation
/// that hit them (exit code 3), except that `teardown-all` continues
/// into its orphan sweep.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state directory {path}: {source}")]
    Dir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Disk-backed VPC record store.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Creates a store rooted at `dir`. The directory itself is created
    /// on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The state directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a VPC's state file.
    #[must_use]
    pub fn path(&self, vpc: &str) -> PathBuf {
        self.dir.join(format!("{vpc}.json"))
    }

    /// Path of a VPC's advisory lock file.
    #[must_use]
    pub fn lock_path(&self, vpc: &str) -> PathBuf {
        self.dir.join(format!("{vpc}.lock"))
    }

    /// Path of the store-wide advisory lock file.
    #[must_use]
    pub fn global_lock_path(&self) -> PathBuf {
        self.dir.join(".global.lock")
    }

    /// Persists a record atomically.
    pub fn put(&self, record: &VpcRecord) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Dir {
            path: self.dir.clone(),
            source,
        })?;

        let target = self.path(&record.name);
        let json = serde_json::to_vec_pretty(record).map_err(|source| StoreError::Corrupt {
            path: target.clone(),
            source,
        })?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|source| StoreError::Io {
                path: target.clone(),
                source,
            })?;
        tmp.write_all(&json).map_err(|source| StoreError::Io {
            path: target.clone(),
            source,
        })?;
        tmp.as_file().sync_all().map_err(|source| StoreError::Io {
            path: target.clone(),
            source,
        })?;
        tmp.persist(&target).map_err(|e| StoreError::Io {
            path: target.clone(),
            source: e.error,
        })?;

        debug!(vpc = %record.name, path = %target.display(), "state written");
        Ok(())
    }

    /// Loads a record; `Ok(None)` when no such VPC is recorded.
    pub fn get(&self, vpc: &str) -> Result<Option<VpcRecord>, StoreError> {
        let path = self.path(vpc);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let record =
            serde_json::from_str(&json).map_err(|source| StoreError::Corrupt { path, source })?;
        Ok(Some(record))
    }

    /// Loads every record in the store, sorted by name. Corrupt files
    /// fail the listing; a caller that must survive them (teardown) can
    /// fall back to [`Self::list_lossy`].
    pub fn list(&self) -> Result<Vec<VpcRecord>, StoreError> {
        let mut records = Vec::new();
        for path in self.state_files()? {
            let json = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            let record: VpcRecord =
                serde_json::from_str(&json).map_err(|source| StoreError::Corrupt {
                    path: path.clone(),
                    source,
                })?;
            records.push(record);
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    /// Loads every readable record, skipping corrupt files with a
    /// warning, and reports whether anything was skipped.
    pub fn list_lossy(&self) -> (Vec<VpcRecord>, bool) {
        let paths = match self.state_files() {
            Ok(paths) => paths,
            Err(err) => {
                warn!(error = %err, "state directory unreadable");
                return (Vec::new(), true);
            }
        };

        let mut records = Vec::new();
        let mut lossy = false;
        for path in paths {
            match fs::read_to_string(&path)
                .map_err(serde_json::Error::io)
                .and_then(|json| serde_json::from_str::<VpcRecord>(&json))
            {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable state file");
                    lossy = true;
                }
            }
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        (records, lossy)
    }

    /// Removes a VPC's state file. Missing files are fine.
    pub fn delete(&self, vpc: &str) -> Result<(), StoreError> {
        let path = self.path(vpc);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(vpc, path = %path.display(), "state deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn state_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Dir {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        Ok(paths)
    }
}
