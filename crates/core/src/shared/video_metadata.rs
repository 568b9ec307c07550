use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Frame count reported by the container; 0 when the container
    /// does not record it.
    pub total_frames: usize,
    pub source_path: Option<PathBuf>,
}
