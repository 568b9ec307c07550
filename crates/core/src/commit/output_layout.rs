use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::shared::constants::{
    CONFIG_DUMP_PREFIX, DATABASE_EXTENSION, DATABASE_STEM, DEBUG_DIR, METADATA_FILE, TRASH_DIR,
};

/// Paths under the output folder.
///
/// ```text
/// <root>/trash/               rejected videos
/// <root>/debug/<stem>.jpg     annotated composites
/// <root>/id_database.json     identity snapshot (+ timestamped backups)
/// <root>/meta.txt             metadata log
/// <root>/cmd_<ts>.json        run configuration
/// <root>/<identity id>/       accepted videos
/// ```
#[derive(Clone, Debug)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the root, trash and debug folders.
    pub fn prepare(&self) -> io::Result<()> {
        fs::create_dir_all(self.trash_dir())?;
        fs::create_dir_all(self.debug_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trash_dir(&self) -> PathBuf {
        self.root.join(TRASH_DIR)
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.root.join(DEBUG_DIR)
    }

    pub fn debug_image(&self, video_stem: &str) -> PathBuf {
        self.debug_dir().join(format!("{video_stem}.jpg"))
    }

    pub fn identity_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    pub fn database(&self) -> PathBuf {
        self.root.join(format!("{DATABASE_STEM}.{DATABASE_EXTENSION}"))
    }

    pub fn metadata_log(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    pub fn config_dump(&self, timestamp: &str) -> PathBuf {
        self.root.join(format!("{CONFIG_DUMP_PREFIX}_{timestamp}.json"))
    }
}

/// First free path for `file_name` in `dir`: the name itself, then
/// `<stem>_1.<ext>`, `<stem>_2.<ext>`, ...
pub fn unique_destination(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let name = Path::new(file_name);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = name.extension().map(|e| e.to_string_lossy().into_owned());
    (1u32..)
        .map(|n| match &ext {
            Some(ext) => dir.join(format!("{stem}_{n}.{ext}")),
            None => dir.join(format!("{stem}_{n}")),
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Moves `src` into `dir`, avoiding name clashes, and returns the new path.
///
/// Falls back to copy + remove when a rename is not possible (e.g. across
/// filesystems).
pub fn move_into(src: &Path, dir: &Path) -> io::Result<PathBuf> {
    let file_name = src
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?
        .to_string_lossy()
        .into_owned();
    let dest = unique_destination(dir, &file_name);
    if dest.file_name() != src.file_name() {
        log::warn!(
            "{} already exists, storing {} as {}",
            dir.join(&file_name).display(),
            src.display(),
            dest.display()
        );
    }
    move_file(src, &dest)?;
    Ok(dest)
}

pub fn move_file(src: &Path, dest: &Path) -> io::Result<()> {
    if fs::rename(src, dest).is_ok() {
        return Ok(());
    }
    fs::copy(src, dest)?;
    if let Err(e) = fs::remove_file(src) {
        let _ = fs::remove_file(dest);
        return Err(e);
    }
    Ok(())
}
