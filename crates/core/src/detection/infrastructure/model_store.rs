use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::constants::{
    EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, YOLO_MODEL_NAME, YOLO_MODEL_URL,
};

const APP_DIR: &str = "FaceCurator";
const DOWNLOAD_CHUNK: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum ModelStoreError {
    #[error("failed to create model directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine a model cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`; `total_bytes` is 0
/// when the server sends no Content-Length.
pub type ProgressFn = Box<dyn Fn(&str, u64, u64) + Send>;

/// A downloadable ONNX model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: &'static str,
    pub url: &'static str,
}

pub const FACE_DETECTION_MODEL: ModelSpec = ModelSpec {
    name: YOLO_MODEL_NAME,
    url: YOLO_MODEL_URL,
};

pub const FACE_EMBEDDING_MODEL: ModelSpec = ModelSpec {
    name: EMBEDDING_MODEL_NAME,
    url: EMBEDDING_MODEL_URL,
};

/// Locates model files, downloading them into the cache on first use.
///
/// Lookup order is the cache directory, then an optional bundled
/// directory, then a download into the cache.
pub struct ModelStore {
    cache_dir: PathBuf,
    bundled_dir: Option<PathBuf>,
}

impl ModelStore {
    pub fn new(cache_dir: impl Into<PathBuf>, bundled_dir: Option<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            bundled_dir,
        }
    }

    /// Store rooted at the platform cache directory.
    pub fn platform_default(bundled_dir: Option<PathBuf>) -> Result<Self, ModelStoreError> {
        Ok(Self::new(default_cache_dir()?, bundled_dir))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns a local path for `model` without touching the network.
    pub fn locate(&self, model: &ModelSpec) -> Option<PathBuf> {
        let cached = self.cache_dir.join(model.name);
        if cached.exists() {
            return Some(cached);
        }
        self.bundled_dir
            .as_ref()
            .map(|dir| dir.join(model.name))
            .filter(|p| p.exists())
    }

    pub fn resolve(
        &self,
        model: &ModelSpec,
        progress: Option<&ProgressFn>,
    ) -> Result<PathBuf, ModelStoreError> {
        if let Some(path) = self.locate(model) {
            log::debug!("Using model {}", path.display());
            return Ok(path);
        }

        fs::create_dir_all(&self.cache_dir).map_err(|e| ModelStoreError::CacheDir {
            path: self.cache_dir.clone(),
            source: e,
        })?;
        let dest = self.cache_dir.join(model.name);
        log::info!("Downloading {} to {}", model.url, dest.display());
        download(model, &dest, progress)?;
        Ok(dest)
    }
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/FaceCurator/models/`
/// - Linux: `$XDG_CACHE_HOME/FaceCurator/models/` or `~/.cache/FaceCurator/models/`
/// - Windows: `%LOCALAPPDATA%/FaceCurator/models/`
pub fn default_cache_dir() -> Result<PathBuf, ModelStoreError> {
    #[cfg(target_os = "macos")]
    let base = dirs::data_dir();
    #[cfg(not(target_os = "macos"))]
    let base = dirs::cache_dir();

    base.map(|d| d.join(APP_DIR).join("models"))
        .ok_or(ModelStoreError::NoCacheDir)
}

/// Streams `model` into `<dest>.part` and renames it into place, so an
/// interrupted download never leaves a truncated model at `dest`.
fn download(
    model: &ModelSpec,
    dest: &Path,
    progress: Option<&ProgressFn>,
) -> Result<(), ModelStoreError> {
    let part = dest.with_extension("part");
    let result = stream_to(model, &part, progress).and_then(|()| {
        fs::rename(&part, dest).map_err(|e| ModelStoreError::Write {
            path: dest.to_path_buf(),
            source: e,
        })
    });
    if result.is_err() {
        let _ = fs::remove_file(&part);
    }
    result
}

fn stream_to(
    model: &ModelSpec,
    part: &Path,
    progress: Option<&ProgressFn>,
) -> Result<(), ModelStoreError> {
    let mut response = reqwest::blocking::get(model.url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelStoreError::Download {
            url: model.url.to_string(),
            source: e,
        })?;
    let total = response.content_length().unwrap_or(0);

    let write_err = |e: std::io::Error| ModelStoreError::Write {
        path: part.to_path_buf(),
        source: e,
    };
    let mut file = File::create(part).map_err(write_err)?;
    let mut buf = vec![0u8; DOWNLOAD_CHUNK];
    let mut downloaded = 0u64;
    loop {
        let n = response.read(&mut buf).map_err(write_err)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_err)?;
        downloaded += n as u64;
        if let Some(cb) = progress {
            cb(model.name, downloaded, total);
        }
    }
    file.sync_all().map_err(write_err)
}
