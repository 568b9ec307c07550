use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::shared::bounding_box::BoundingBox;

/// One accepted video: `stem,id,` followed by the integer corners
/// `x0,y0,x1,y1` of the dominant face in the start, mid and end frames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataRecord {
    pub video_stem: String,
    pub identity_id: String,
    pub boxes: [[i32; 4]; 3],
}

impl MetadataRecord {
    pub fn new(
        video_stem: impl Into<String>,
        identity_id: impl Into<String>,
        boxes: [BoundingBox; 3],
    ) -> Self {
        Self {
            video_stem: video_stem.into(),
            identity_id: identity_id.into(),
            boxes: boxes.map(|b| b.corners()),
        }
    }
}

impl fmt::Display for MetadataRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.video_stem, self.identity_id)?;
        for value in self.boxes.iter().flatten() {
            write!(f, ",{value}")?;
        }
        Ok(())
    }
}

/// Append-only metadata file, opened once per run.
pub struct MetadataLog {
    path: PathBuf,
    file: File,
}

impl MetadataLog {
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current length in bytes, used as a rollback mark.
    pub fn byte_len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Writes one line and makes it durable before returning.
    pub fn append(&mut self, record: &MetadataRecord) -> io::Result<()> {
        writeln!(self.file, "{record}")?;
        self.file.flush()?;
        self.file.sync_data()
    }

    /// Drops everything past `len`, undoing a partially written line.
    pub fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)?;
        self.file.sync_data()
    }

    pub fn close(mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }
}
