//! Embedding extractor: detection + crop + embedding behind two model seams.
//!
//! The detector and embedding model are collaborators; anything that
//! implements [`FaceDetect`] / [`FaceEmbed`] can be plugged in.

use crate::bgr::BgrImage;
use crate::detector::DetectorError;
use crate::recognizer::RecognizerError;
use crate::types::{BoundingBox, Embedding};
use image::RgbImage;
use thiserror::Error;

/// Finds faces in a BGR frame.
pub trait FaceDetect {
    /// Bounding boxes sorted by confidence, highest first. An empty list
    /// means no face, not an error.
    fn detect(&mut self, image: &BgrImage) -> Result<Vec<BoundingBox>, DetectorError>;
}

/// Turns an RGB face crop into an embedding.
pub trait FaceEmbed {
    fn embed(&mut self, face_rgb: &RgbImage) -> Result<Embedding, RecognizerError>;
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no face detected")]
    NoFace,
    #[error("face detection failed: {0}")]
    Detection(#[from] DetectorError),
    #[error("embedding failed: {0}")]
    Embedding(#[from] RecognizerError),
}

/// A detected face and its pixels.
#[derive(Debug, Clone)]
pub struct FaceCrop {
    pub bbox: BoundingBox,
    pub image: BgrImage,
}

pub struct EmbeddingExtractor<D, E> {
    detector: D,
    embedder: E,
}

impl<D: FaceDetect, E: FaceEmbed> EmbeddingExtractor<D, E> {
    pub fn new(detector: D, embedder: E) -> Self {
        Self { detector, embedder }
    }

    /// Crop the primary (most confident) face out of `frame`.
    pub fn extract_face(&mut self, frame: &BgrImage) -> Result<FaceCrop, ExtractError> {
        let faces = self.detector.detect(frame)?;
        let bbox = faces.into_iter().next().ok_or(ExtractError::NoFace)?;
        let image = frame.crop(&bbox).ok_or(ExtractError::NoFace)?;
        Ok(FaceCrop { bbox, image })
    }

    /// Embed a BGR face crop. Detection is not re-run on the crop.
    pub fn get_embedding(&mut self, face: &BgrImage) -> Result<Embedding, ExtractError> {
        if face.width() == 0 || face.height() == 0 {
            return Err(RecognizerError::EmptyCrop.into());
        }
        Ok(self.embedder.embed(&face.to_rgb())?)
    }

    /// Every face in `frame`. Never fails: a detector error is logged and
    /// treated as an empty frame, and zero-area crops are dropped.
    pub fn detect_all(&mut self, frame: &BgrImage) -> Vec<FaceCrop> {
        let faces = match self.detector.detect(frame) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::debug!(error = %e, "detection failed; treating frame as empty");
                return Vec::new();
            }
        };

        faces
            .into_iter()
            .filter_map(|bbox| {
                let image = frame.crop(&bbox)?;
                Some(FaceCrop { bbox, image })
            })
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;

    #[test]
    fn test_extract_face_crops_first_detection() {
        let detector = ScriptedDetector::new(vec![
            bbox(10.0, 0.0, 5.0, 5.0, 0.9),
            bbox(0.0, 0.0, 5.0, 5.0, 0.6),
        ]);
        let mut extractor = EmbeddingExtractor::new(detector, PixelEmbedder);
        let face = extractor.extract_face(&two_tone_frame()).unwrap();
        assert_eq!(face.bbox.confidence, 0.9);
        assert_eq!((face.image.width(), face.image.height()), (5, 5));
        assert_eq!(face.image.pixel(0, 0), Some([3, 2, 1]));
    }

    #[test]
    fn test_extract_face_no_face() {
        let mut extractor = EmbeddingExtractor::new(ScriptedDetector::new(vec![]), PixelEmbedder);
        assert!(matches!(extractor.extract_face(&two_tone_frame()), Err(ExtractError::NoFace)));
    }

    #[test]
    fn test_extract_face_detector_error_is_reported() {
        let mut detector = ScriptedDetector::new(vec![]);
        detector.fail = true;
        let mut extractor = EmbeddingExtractor::new(detector, PixelEmbedder);
        assert!(matches!(extractor.extract_face(&two_tone_frame()), Err(ExtractError::Detection(_))));
    }

    #[test]
    fn test_get_embedding_converts_to_rgb() {
        let mut extractor = EmbeddingExtractor::new(ScriptedDetector::new(vec![]), PixelEmbedder);
        let crop = BgrImage::filled(4, 4, [30, 20, 10]);
        let emb = extractor.get_embedding(&crop).unwrap();
        assert_eq!(emb.values, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_get_embedding_model_failure() {
        let mut extractor = EmbeddingExtractor::new(ScriptedDetector::new(vec![]), PixelEmbedder);
        let crop = BgrImage::filled(4, 4, [0, 0, 0]);
        assert!(matches!(extractor.get_embedding(&crop), Err(ExtractError::Embedding(_))));
    }

    #[test]
    fn test_detect_all_skips_zero_area_and_survives_errors() {
        let detector = ScriptedDetector::new(vec![
            bbox(0.0, 0.0, 5.0, 5.0, 0.9),
            bbox(50.0, 50.0, 5.0, 5.0, 0.8), // entirely off-frame
            bbox(12.0, 2.0, 0.0, 4.0, 0.7),  // zero width
        ]);
        let mut extractor = EmbeddingExtractor::new(detector, PixelEmbedder);
        let faces = extractor.detect_all(&two_tone_frame());
        assert_eq!(faces.len(), 1);

        let mut failing = ScriptedDetector::new(vec![]);
        failing.fail = true;
        let mut extractor = EmbeddingExtractor::new(failing, PixelEmbedder);
        assert!(extractor.detect_all(&two_tone_frame()).is_empty());
    }
}
