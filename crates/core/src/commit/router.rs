use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::commit::commit_gate::CommitGate;
use crate::commit::curation_session::CurationSession;
use crate::commit::metadata_log::MetadataRecord;
use crate::commit::output_layout::{move_file, move_into, OutputLayout};
use crate::identity::domain::identity_database::Assignment;
use crate::identity::infrastructure::database_file::DatabaseError;
use crate::shared::bounding_box::BoundingBox;

#[derive(Error, Debug)]
pub enum CommitError {
    #[error("failed to stage identity database: {0}")]
    Stage(#[source] DatabaseError),
    #[error("failed to publish identity database: {0}")]
    Publish(#[source] DatabaseError),
    #[error("failed to create identity folder {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to move {from} into {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to append to metadata log {path}: {source}")]
    MetadataLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where an accepted video ended up.
#[derive(Clone, Debug, PartialEq)]
pub struct CommittedVideo {
    pub destination: PathBuf,
    pub record: MetadataRecord,
}

/// Moves videos to their final folder, keeping the identity database and
/// metadata log in step with the file system.
pub struct Router {
    layout: OutputLayout,
    gate: CommitGate,
}

impl Router {
    pub fn new(layout: OutputLayout, gate: CommitGate) -> Self {
        Self { layout, gate }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Moves a rejected video into the trash folder.
    pub fn discard(&self, video: &Path) -> Result<PathBuf, CommitError> {
        let trash = self.layout.trash_dir();
        self.gate.critical(|| {
            move_into(video, &trash).map_err(|e| CommitError::Move {
                from: video.to_path_buf(),
                to: trash.clone(),
                source: e,
            })
        })
    }

    /// Applies `assignment` as one unit: the video lands in the identity
    /// folder, the database snapshot is replaced and a metadata line is
    /// appended, or none of it is visible afterwards.
    ///
    /// The session's in-memory database is updated only once all three
    /// steps succeeded.
    pub fn commit(
        &self,
        session: &mut CurationSession,
        video: &Path,
        assignment: &Assignment,
        boxes: [BoundingBox; 3],
    ) -> Result<CommittedVideo, CommitError> {
        self.gate
            .critical(|| self.apply(session, video, assignment, boxes))
    }

    fn apply(
        &self,
        session: &mut CurationSession,
        video: &Path,
        assignment: &Assignment,
        boxes: [BoundingBox; 3],
    ) -> Result<CommittedVideo, CommitError> {
        let updated = session.database.with_assignment(assignment);
        let had_snapshot = session.database_file.path().is_file();
        let staged = session
            .database_file
            .stage(&updated)
            .map_err(CommitError::Stage)?;

        let identity_dir = self.layout.identity_dir(assignment.id());
        let created_dir = !identity_dir.exists();
        fs::create_dir_all(&identity_dir).map_err(|e| CommitError::CreateDir {
            path: identity_dir.clone(),
            source: e,
        })?;
        let undo_dir = || {
            if created_dir {
                let _ = fs::remove_dir(&identity_dir);
            }
        };

        let log_mark = match session.log.byte_len() {
            Ok(len) => len,
            Err(e) => {
                undo_dir();
                return Err(CommitError::MetadataLog {
                    path: session.log.path().to_path_buf(),
                    source: e,
                });
            }
        };

        let destination = match move_into(video, &identity_dir) {
            Ok(dest) => dest,
            Err(e) => {
                undo_dir();
                return Err(CommitError::Move {
                    from: video.to_path_buf(),
                    to: identity_dir.clone(),
                    source: e,
                });
            }
        };
        let undo_move = || {
            if let Err(e) = move_file(&destination, video) {
                log::error!(
                    "Rollback failed: {} could not be moved back to {}: {e}",
                    destination.display(),
                    video.display()
                );
            }
            undo_dir();
        };

        if let Err(e) = staged.publish() {
            // The rename may have landed even though publishing failed.
            restore_snapshot(session, had_snapshot);
            undo_move();
            return Err(CommitError::Publish(e));
        }

        let stem = destination
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let record = MetadataRecord::new(stem, assignment.id(), boxes);

        if let Err(e) = session.log.append(&record) {
            if let Err(te) = session.log.truncate(log_mark) {
                log::error!("Rollback failed: metadata log not truncated: {te}");
            }
            restore_snapshot(session, had_snapshot);
            undo_move();
            return Err(CommitError::MetadataLog {
                path: session.log.path().to_path_buf(),
                source: e,
            });
        }

        session.database = updated;
        Ok(CommittedVideo {
            destination,
            record,
        })
    }
}

/// Puts the on-disk snapshot back to the session's committed state. A
/// snapshot that did not exist before the commit is removed again.
fn restore_snapshot(session: &CurationSession, had_snapshot: bool) {
    let file = &session.database_file;
    let restored = if had_snapshot {
        file.save(&session.database).map_err(|e| e.to_string())
    } else {
        match fs::remove_file(file.path()) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.to_string()),
            _ => Ok(()),
        }
    };
    if let Err(e) = restored {
        log::error!(
            "Rollback failed: identity database {} not restored: {e}",
            file.path().display()
        );
    }
}
