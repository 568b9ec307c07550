use std::path::PathBuf;
use std::process;

use clap::Parser;

use face_curator_core::commit::commit_gate::CommitGate;
use face_curator_core::detection::infrastructure::model_store::{
    ModelStore, ProgressFn, FACE_DETECTION_MODEL, FACE_EMBEDDING_MODEL,
};
use face_curator_core::detection::infrastructure::onnx_face_oracle::OnnxFaceOracle;
use face_curator_core::identity::domain::match_strategy::MatchStrategy;
use face_curator_core::pipeline::curate_videos_use_case::{run_timestamp, CurateVideosUseCase};
use face_curator_core::pipeline::curation_config::CurationConfig;
use face_curator_core::pipeline::curation_logger::StdoutCurationLogger;
use face_curator_core::shared::constants::{
    DEFAULT_DETECTION_CONFIDENCE, DEFAULT_MIN_FACE_RATIO, DEFAULT_MIN_FRAMES,
    DEFAULT_SIMILARITY_THRESHOLD,
};
use face_curator_core::video::infrastructure::ffmpeg_reader::FfmpegReader;
use face_curator_core::video::infrastructure::image_file_writer::ImageFileWriter;

/// Sort a folder of face videos into per-identity folders.
#[derive(Parser, Debug)]
#[command(name = "face-curator")]
struct Cli {
    /// Folder of .mp4 videos to curate. Videos are moved out of it.
    source: PathBuf,

    /// Output folder for identity folders, trash, debug images and the database.
    output: PathBuf,

    /// Videos with fewer frames are rejected before face detection.
    #[arg(long = "min_frames", visible_alias = "min-frames", default_value_t = DEFAULT_MIN_FRAMES)]
    min_frames: usize,

    /// Minimum largest-face side as a fraction of the frame's longest side.
    #[arg(long = "min_face_ratio", visible_alias = "min-face-ratio", default_value_t = DEFAULT_MIN_FACE_RATIO)]
    min_face_ratio: f64,

    /// Cosine similarity needed both across a video's frames and to join an identity.
    #[arg(
        long = "similarity_threshold",
        visible_alias = "similarity-threshold",
        default_value_t = DEFAULT_SIMILARITY_THRESHOLD,
        allow_negative_numbers = true
    )]
    similarity_threshold: f64,

    /// Numbering base for new identity ids.
    #[arg(long = "id_offset", visible_alias = "id-offset", default_value_t = 0)]
    id_offset: usize,

    /// Identity matching: first (first eligible in creation order) or best.
    #[arg(long = "match_strategy", visible_alias = "match-strategy", default_value = "first")]
    match_strategy: MatchStrategy,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, default_value_t = DEFAULT_DETECTION_CONFIDENCE)]
    confidence: f64,

    /// Also write debug composites for accepted videos.
    #[arg(long = "debug_accepted", visible_alias = "debug-accepted")]
    debug_accepted: bool,

    /// Directory searched for model files before downloading them.
    #[arg(long = "model_dir", visible_alias = "model-dir")]
    model_dir: Option<PathBuf>,
}

impl Cli {
    fn config(&self) -> CurationConfig {
        CurationConfig {
            min_frames: self.min_frames,
            min_face_ratio: self.min_face_ratio,
            similarity_threshold: self.similarity_threshold,
            id_offset: self.id_offset,
            match_strategy: self.match_strategy,
            confidence: self.confidence,
            debug_accepted: self.debug_accepted,
            ..CurationConfig::new(&self.source, &self.output)
        }
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.config();
    config.validate()?;
    log::info!(
        "Curating {} into {} (match strategy: {})",
        config.source.display(),
        config.output.display(),
        config.match_strategy
    );

    let store = ModelStore::platform_default(cli.model_dir.clone())?;
    let progress: ProgressFn = Box::new(download_progress);
    log::info!("Resolving models in {}", store.cache_dir().display());
    let detector_path = store.resolve(&FACE_DETECTION_MODEL, Some(&progress))?;
    let embedder_path = store.resolve(&FACE_EMBEDDING_MODEL, Some(&progress))?;
    let oracle = OnnxFaceOracle::new(&detector_path, &embedder_path, config.confidence)?;

    let gate = CommitGate::new();
    gate.install_interrupt_handler()?;

    let mut use_case = CurateVideosUseCase::new(
        config,
        Box::new(FfmpegReader::new()),
        Box::new(oracle),
        Box::new(ImageFileWriter::new()),
        gate,
        Box::new(StdoutCurationLogger::default()),
    );
    let summary = use_case.execute(&run_timestamp())?;
    log::info!(
        "Done: {} accepted, {} rejected",
        summary.accepted(),
        summary.total_rejected()
    );
    Ok(())
}

fn download_progress(model: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {model}... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading {model}... {downloaded} bytes");
    }
}
