use std::io;

use crate::commit::metadata_log::MetadataLog;
use crate::identity::domain::identity_database::IdentityDatabase;
use crate::identity::infrastructure::database_file::DatabaseFile;

/// State one curation run owns: the identity database as last committed,
/// its snapshot file and the open metadata log.
///
/// Only [`Router::commit`](crate::commit::router::Router::commit) mutates
/// it, so the in-memory database never gets ahead of what is on disk.
pub struct CurationSession {
    pub(crate) database: IdentityDatabase,
    pub(crate) database_file: DatabaseFile,
    pub(crate) log: MetadataLog,
}

impl CurationSession {
    pub fn new(database: IdentityDatabase, database_file: DatabaseFile, log: MetadataLog) -> Self {
        Self {
            database,
            database_file,
            log,
        }
    }

    pub fn database(&self) -> &IdentityDatabase {
        &self.database
    }

    pub fn database_file(&self) -> &DatabaseFile {
        &self.database_file
    }

    /// Flushes the metadata log and releases it.
    pub fn close(self) -> io::Result<IdentityDatabase> {
        self.log.close()?;
        Ok(self.database)
    }
}
