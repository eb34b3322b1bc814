//! neuraface-core: face recognition pipeline for attendance.
//!
//! SCRFD detection and ArcFace embeddings run via ONNX Runtime; matching is
//! a brute-force L2 scan over the enrolled embedding index.

pub mod bgr;
pub mod detector;
pub mod extractor;
pub mod index;
pub mod matcher;
pub mod overlay;
pub mod recognizer;
pub mod session;
pub mod types;

use std::path::PathBuf;

pub use bgr::{encode_png, BgrImage, FrameError};
pub use detector::FaceDetector;
pub use extractor::{EmbeddingExtractor, ExtractError, FaceCrop, FaceDetect, FaceEmbed};
pub use index::{EmbeddingIndex, IndexError};
pub use matcher::{EuclideanMatcher, FrameVerdict, MatchError, MatchResult, Matcher, DEFAULT_DISTANCE_THRESHOLD};
pub use overlay::{Overlay, OverlayError};
pub use recognizer::{FaceRecognizer, ARCFACE_EMBEDDING_DIM};
pub use session::{AttendanceLedger, FrameReport, RecognitionSession, Recognized, SessionError, SessionState};
pub use types::{BoundingBox, DetectionResult, Embedding, Identity};

/// SCRFD detection model file name.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// `$XDG_DATA_HOME/neuraface`, falling back to `~/.local/share/neuraface`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("neuraface")
}

/// Where the ONNX model files are looked up by default.
pub fn default_model_dir() -> PathBuf {
    default_data_dir().join("models")
}
