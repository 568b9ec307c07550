use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::commit::router::CommitError;
use crate::identity::domain::identity_database::IdentityError;
use crate::identity::infrastructure::database_file::DatabaseError;

/// Failures that stop the run. Per-video problems are
/// [`Rejection`](crate::shared::rejection::Rejection)s instead.
#[derive(Error, Debug)]
pub enum CurationError {
    #[error("failed to prepare output folder {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to list videos in {path}: {source}")]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("failed to open metadata log {path}: {source}")]
    MetadataLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write configuration dump {path}: {source}")]
    ConfigDump {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("face analysis failed for {video}: {message}")]
    Oracle { video: PathBuf, message: String },
    #[error("identity {0} already exists in the database; choose a different id offset")]
    IdCollision(String),
    #[error("cannot assign {video}: {source}")]
    Identity {
        video: PathBuf,
        #[source]
        source: IdentityError,
    },
    #[error("failed to commit {video}: {source}")]
    Commit {
        video: PathBuf,
        #[source]
        source: CommitError,
    },
    #[error("failed to move rejected video {video} to trash: {source}")]
    Trash {
        video: PathBuf,
        #[source]
        source: CommitError,
    },
}

impl CurationError {
    pub(crate) fn identity(video: PathBuf, error: IdentityError) -> Self {
        match error {
            IdentityError::IdCollision(id) => CurationError::IdCollision(id),
            source => CurationError::Identity { video, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_collision_is_lifted() {
        let err = CurationError::identity(
            PathBuf::from("a.mp4"),
            IdentityError::IdCollision("id_000004".into()),
        );
        assert!(matches!(err, CurationError::IdCollision(ref id) if id == "id_000004"));
        assert!(err.to_string().contains("id_000004"));
    }

    #[test]
    fn test_other_identity_errors_keep_video() {
        let err = CurationError::identity(
            PathBuf::from("a.mp4"),
            IdentityError::DimensionMismatch {
                expected: 512,
                found: 128,
            },
        );
        assert!(matches!(err, CurationError::Identity { .. }));
        assert!(err.to_string().contains("a.mp4"));
    }
}
