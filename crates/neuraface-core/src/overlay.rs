//! Detection overlays for snapshots: a box per face, labelled with the
//! matched name.

use crate::bgr::BgrImage;
use crate::types::DetectionResult;
use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;
use thiserror::Error;

/// Box colour for a recognised student.
pub const KNOWN_RGB: Rgb<u8> = Rgb([0, 255, 0]);
/// Box colour for an unrecognised face.
pub const UNKNOWN_RGB: Rgb<u8> = Rgb([255, 0, 0]);

const LABEL_SCALE: f32 = 18.0;

/// Fonts tried, in order, when none is configured.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
];

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("could not read font {path}: {source}")]
    FontRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid font {path}: {source}")]
    InvalidFont {
        path: String,
        #[source]
        source: ab_glyph::InvalidFont,
    },
}

/// Draws detection boxes, and name labels when a font is available.
pub struct Overlay {
    font: Option<FontArc>,
    scale: PxScale,
}

impl Overlay {
    /// Boxes only.
    pub fn without_labels() -> Self {
        Self {
            font: None,
            scale: PxScale::from(LABEL_SCALE),
        }
    }

    /// Label with the font at `path`.
    pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self, OverlayError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| OverlayError::FontRead {
            path: path.display().to_string(),
            source,
        })?;
        let font = FontArc::try_from_vec(bytes).map_err(|source| OverlayError::InvalidFont {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self {
            font: Some(font),
            scale: PxScale::from(LABEL_SCALE),
        })
    }

    /// Use the first installed system font; fall back to unlabelled boxes.
    pub fn with_system_font() -> Self {
        for path in SYSTEM_FONTS {
            if !Path::new(path).exists() {
                continue;
            }
            match Self::with_font_file(path) {
                Ok(overlay) => return overlay,
                Err(e) => tracing::debug!(error = %e, "skipping font"),
            }
        }
        tracing::warn!("no usable font found; snapshot boxes will not be labelled");
        Self::without_labels()
    }

    pub fn has_labels(&self) -> bool {
        self.font.is_some()
    }

    /// An RGB copy of `frame` with every detection outlined, green for known
    /// faces and red for unknown ones.
    pub fn render(&self, frame: &BgrImage, results: &[DetectionResult]) -> RgbImage {
        let mut image = frame.to_rgb();
        self.draw_detections(&mut image, results);
        image
    }

    pub fn draw_detections(&self, image: &mut RgbImage, results: &[DetectionResult]) {
        for r in results {
            let colour = if r.identity.is_known() { KNOWN_RGB } else { UNKNOWN_RGB };

            let x = r.bbox.x.max(0.0) as i32;
            let y = r.bbox.y.max(0.0) as i32;
            let width = r.bbox.width.min(image.width() as f32 - x as f32) as u32;
            let height = r.bbox.height.min(image.height() as f32 - y as f32) as u32;
            if width == 0 || height == 0 {
                continue;
            }

            draw_hollow_rect_mut(image, Rect::at(x, y).of_size(width, height), colour);
            if width > 2 && height > 2 {
                let inner = Rect::at(x + 1, y + 1).of_size(width - 2, height - 2);
                draw_hollow_rect_mut(image, inner, colour);
            }

            if let Some(font) = &self.font {
                let label = format!("{} {:.2}", r.identity.display_name(), r.distance);
                let text_y = (y - LABEL_SCALE as i32 - 2).max(0);
                draw_text_mut(image, colour, x, text_y, self.scale, font, &label);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Identity};

    fn results() -> Vec<DetectionResult> {
        vec![
            DetectionResult {
                bbox: BoundingBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0, confidence: 0.9 },
                identity: Identity::Known { student_id: "s1".into(), name: "Alice".into() },
                distance: 0.5,
            },
            DetectionResult {
                bbox: BoundingBox { x: 20.0, y: 0.0, width: 10.0, height: 10.0, confidence: 0.8 },
                identity: Identity::Unknown,
                distance: 9.0,
            },
        ]
    }

    #[test]
    fn test_colours_follow_identity() {
        let frame = BgrImage::filled(40, 20, [0, 0, 0]);
        let image = Overlay::without_labels().render(&frame, &results());

        assert_eq!(*image.get_pixel(0, 0), KNOWN_RGB);
        assert_eq!(*image.get_pixel(20, 5), UNKNOWN_RGB);
        assert_eq!(*image.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_boxes_past_the_edge_are_clipped() {
        let frame = BgrImage::filled(8, 8, [0, 0, 0]);
        let mut clipped = results();
        clipped[0].bbox = BoundingBox { x: 4.0, y: 4.0, width: 50.0, height: 50.0, confidence: 0.9 };
        clipped[1].bbox = BoundingBox { x: 30.0, y: 0.0, width: 5.0, height: 5.0, confidence: 0.8 };

        let image = Overlay::without_labels().render(&frame, &clipped);
        assert_eq!(*image.get_pixel(4, 4), KNOWN_RGB);
        assert_eq!(*image.get_pixel(7, 7), KNOWN_RGB);
    }

    #[test]
    fn test_missing_font_is_an_error() {
        let err = Overlay::with_font_file("/nonexistent/neuraface.ttf").err().unwrap();
        assert!(matches!(err, OverlayError::FontRead { .. }));
        assert!(!Overlay::without_labels().has_labels());
    }
}
