pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4"];

pub const DEFAULT_MIN_FRAMES: usize = 30;
pub const DEFAULT_MIN_FACE_RATIO: f64 = 0.3;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.6;
pub const DEFAULT_DETECTION_CONFIDENCE: f64 = 0.5;

/// Weight kept by an identity centroid when a new video is merged into it.
pub const CENTROID_RETAIN_WEIGHT: f32 = 0.9;
/// Weight given to the incoming video descriptor.
pub const CENTROID_SAMPLE_WEIGHT: f32 = 0.1;

/// Output layout names.
pub const TRASH_DIR: &str = "trash";
pub const DEBUG_DIR: &str = "debug";
pub const DATABASE_STEM: &str = "id_database";
pub const DATABASE_EXTENSION: &str = "json";
pub const METADATA_FILE: &str = "meta.txt";
pub const CONFIG_DUMP_PREFIX: &str = "cmd";

/// `chrono` format used for backup and config dump file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
