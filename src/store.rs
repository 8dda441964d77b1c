//! Durable workflow state store.
//!
//! One versioned JSON record per workflow instance, held in a directory of
//! `<id>.json` files. Updates use compare-and-set: a mutation is applied
//! only if the record's version has not changed since it was loaded, so a
//! crash-and-restart can never apply a stale update. Writes go through a
//! temp file + rename so a crash mid-write leaves the previous record
//! intact.

use crate::errors::StoreError;
use crate::workflow::WorkflowInstance;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A store record paired with the version it was loaded at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedInstance {
    pub version: u64,
    pub instance: WorkflowInstance,
}

pub struct WorkflowStore {
    dir: PathBuf,
}

impl WorkflowStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, id: &Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Create the record for a new instance at version 1.
    pub fn create(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        let path = self.record_path(&instance.id);
        if path.exists() {
            return Err(StoreError::AlreadyExists { id: instance.id });
        }
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let record = VersionedInstance {
            version: 1,
            instance: instance.clone(),
        };
        self.write_record(&path, &record)
    }

    pub fn load(&self, id: &Uuid) -> Result<VersionedInstance, StoreError> {
        let path = self.record_path(id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound { id: *id });
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt { path, source })
    }

    /// Replace the record, but only if it is still at `expected_version`.
    ///
    /// Returns the new version on success. A `Conflict` means another tick
    /// already advanced the state; the caller aborts without side effects.
    pub fn update(
        &self,
        expected_version: u64,
        instance: &WorkflowInstance,
    ) -> Result<u64, StoreError> {
        let current = self.load(&instance.id)?;
        if current.version != expected_version {
            return Err(StoreError::Conflict {
                id: instance.id,
                expected: expected_version,
                found: current.version,
            });
        }
        let record = VersionedInstance {
            version: expected_version + 1,
            instance: instance.clone(),
        };
        self.write_record(&self.record_path(&instance.id), &record)?;
        Ok(record.version)
    }

    /// Remove the record. Removing an absent record is a no-op.
    pub fn remove(&self, id: &Uuid) -> Result<(), StoreError> {
        let path = self.record_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Ids of all stored instances.
    pub fn list(&self) -> Result<Vec<Uuid>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let name = entry.file_name();
            let Some(stem) = Path::new(&name).file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(id) = Uuid::parse_str(stem) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn write_record(&self, path: &Path, record: &VersionedInstance) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(record).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
