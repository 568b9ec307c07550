use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::domain::match_strategy::MatchStrategy;
use crate::shared::constants::{
    DEFAULT_DETECTION_CONFIDENCE, DEFAULT_MIN_FACE_RATIO, DEFAULT_MIN_FRAMES,
    DEFAULT_SIMILARITY_THRESHOLD,
};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("source folder {0} does not exist")]
    MissingSource(PathBuf),
    #[error("min_face_ratio must be in (0, 1], got {0}")]
    FaceRatio(f64),
    #[error("similarity_threshold must be in [-1, 1], got {0}")]
    SimilarityThreshold(f64),
    #[error("confidence must be in [0, 1], got {0}")]
    Confidence(f64),
}

/// Parameters of one curation run. Dumped verbatim next to the outputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurationConfig {
    pub source: PathBuf,
    pub output: PathBuf,
    pub min_frames: usize,
    pub min_face_ratio: f64,
    pub similarity_threshold: f64,
    pub id_offset: usize,
    #[serde(default)]
    pub match_strategy: MatchStrategy,
    pub confidence: f64,
    #[serde(default)]
    pub debug_accepted: bool,
}

impl CurationConfig {
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            min_frames: DEFAULT_MIN_FRAMES,
            min_face_ratio: DEFAULT_MIN_FACE_RATIO,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            id_offset: 0,
            match_strategy: MatchStrategy::default(),
            confidence: DEFAULT_DETECTION_CONFIDENCE,
            debug_accepted: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.source.is_dir() {
            return Err(ConfigError::MissingSource(self.source.clone()));
        }
        if !(self.min_face_ratio > 0.0 && self.min_face_ratio <= 1.0) {
            return Err(ConfigError::FaceRatio(self.min_face_ratio));
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::SimilarityThreshold(self.similarity_threshold));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ConfigError::Confidence(self.confidence));
        }
        Ok(())
    }

    /// Writes the configuration as pretty JSON.
    pub fn dump(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }
}
