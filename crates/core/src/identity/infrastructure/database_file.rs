use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::domain::identity_database::{IdentityDatabase, IdentityError, IdentityRecord};

const FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("failed to read identity database {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write identity database {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("identity database {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("identity database {path} is inconsistent: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: IdentityError,
    },
}

#[derive(Serialize, Deserialize)]
struct DatabaseDocument {
    version: u32,
    identities: Vec<IdentityRecord>,
}

/// JSON snapshot of the identity database on disk.
///
/// Writes go to a sibling temp file that is fsynced and renamed over the
/// snapshot, so a crash leaves either the old or the new state, never a
/// torn file.
pub struct DatabaseFile {
    path: PathBuf,
}

impl DatabaseFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot; a missing file is an empty database.
    pub fn load(&self) -> Result<IdentityDatabase, DatabaseError> {
        if !self.path.exists() {
            return Ok(IdentityDatabase::new());
        }
        let bytes = fs::read(&self.path).map_err(|e| DatabaseError::Read {
            path: self.path.clone(),
            source: e,
        })?;
        let document: DatabaseDocument =
            serde_json::from_slice(&bytes).map_err(|e| DatabaseError::Malformed {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        if document.version != FORMAT_VERSION {
            return Err(DatabaseError::Malformed {
                path: self.path.clone(),
                reason: format!("unsupported version {}", document.version),
            });
        }
        IdentityDatabase::from_records(document.identities).map_err(|e| DatabaseError::Invalid {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Copies an existing snapshot to `<stem>_<suffix>.<ext>`.
    ///
    /// Returns the backup path, or `None` when there was nothing to back up.
    pub fn backup(&self, suffix: &str) -> Result<Option<PathBuf>, DatabaseError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match self.path.extension() {
            Some(ext) => format!("{stem}_{suffix}.{}", ext.to_string_lossy()),
            None => format!("{stem}_{suffix}"),
        };
        let backup = self.path.with_file_name(name);
        fs::copy(&self.path, &backup).map_err(|e| DatabaseError::Write {
            path: backup.clone(),
            source: e,
        })?;
        Ok(Some(backup))
    }

    /// Serializes `database` to a durable temp file next to the snapshot.
    ///
    /// Nothing is visible at [`path`](Self::path) until the returned
    /// [`StagedSnapshot`] is published.
    pub fn stage(&self, database: &IdentityDatabase) -> Result<StagedSnapshot, DatabaseError> {
        let document = DatabaseDocument {
            version: FORMAT_VERSION,
            identities: database.records().to_vec(),
        };
        let payload =
            serde_json::to_vec_pretty(&document).map_err(|e| DatabaseError::Malformed {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        let tmp_path = self.path.with_extension("tmp");
        let staged = StagedSnapshot {
            tmp_path,
            dest: self.path.clone(),
            published: false,
        };
        let write_err = |e: std::io::Error| DatabaseError::Write {
            path: staged.tmp_path.clone(),
            source: e,
        };
        let mut file = File::create(&staged.tmp_path).map_err(write_err)?;
        file.write_all(&payload).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        Ok(staged)
    }

    pub fn save(&self, database: &IdentityDatabase) -> Result<(), DatabaseError> {
        self.stage(database)?.publish()
    }
}

/// A fully written snapshot waiting to replace the live one.
///
/// Dropping it without publishing removes the temp file.
#[derive(Debug)]
pub struct StagedSnapshot {
    tmp_path: PathBuf,
    dest: PathBuf,
    published: bool,
}

impl StagedSnapshot {
    pub fn publish(mut self) -> Result<(), DatabaseError> {
        fs::rename(&self.tmp_path, &self.dest).map_err(|e| DatabaseError::Write {
            path: self.dest.clone(),
            source: e,
        })?;
        self.published = true;
        sync_parent_dir(&self.dest).map_err(|e| DatabaseError::Write {
            path: self.dest.clone(),
            source: e,
        })
    }
}

impl Drop for StagedSnapshot {
    fn drop(&mut self) {
        if !self.published {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            File::open(parent)?.sync_all()?;
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
