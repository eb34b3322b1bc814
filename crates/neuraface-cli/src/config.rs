use std::path::PathBuf;

/// Runtime configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// L2 distance below which a face counts as a registered student.
    pub distance_threshold: f32,
    /// Capture timer period in milliseconds.
    pub tick_ms: u64,
    /// Frames to discard after opening a camera (AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Flip frames horizontally so the preview reads like a mirror.
    pub mirror: bool,
    /// TrueType font for snapshot labels; a system font is tried when unset.
    pub font_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `NEURAFACE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("NEURAFACE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| neuraface_core::default_model_dir());

        let db_path = std::env::var("NEURAFACE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| neuraface_core::default_data_dir().join("database.db"));

        Self {
            camera_device: std::env::var("NEURAFACE_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir,
            db_path,
            distance_threshold: env_f32(
                "NEURAFACE_DISTANCE_THRESHOLD",
                neuraface_core::DEFAULT_DISTANCE_THRESHOLD,
            ),
            tick_ms: env_u64("NEURAFACE_TICK_MS", 10).max(1),
            warmup_frames: env_usize("NEURAFACE_WARMUP_FRAMES", 4),
            mirror: env_flag("NEURAFACE_MIRROR", true),
            font_path: std::env::var("NEURAFACE_FONT").ok().map(PathBuf::from),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(neuraface_core::DETECTOR_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> String {
        self.model_dir
            .join(neuraface_core::RECOGNIZER_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| parse_flag(&v).unwrap_or(default))
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
