use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::shared::constants::VIDEO_EXTENSIONS;

/// Regular files in `dir` (not recursive) with a video extension, sorted by
/// path so runs are reproducible.
pub fn list_videos(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut videos = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && is_video(&path) {
            videos.push(path);
        }
    }
    videos.sort();
    Ok(videos)
}

pub fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(e))
        })
        .unwrap_or(false)
}
