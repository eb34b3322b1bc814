//! Packed 8-bit BGR images, the pixel format camera frames arrive in.
//!
//! Face models want RGB, so conversion goes through [`image::RgbImage`].

use crate::types::BoundingBox;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

const CHANNELS: usize = 3;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid BGR length for {width}x{height}: expected {expected}, got {actual}")]
    InvalidLength {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("image codec: {0}")]
    Codec(#[from] image::ImageError),
}

/// A BGR image, row-major, 3 bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgrImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl BgrImage {
    /// Wrap packed BGR bytes, checking the length against the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, width, height })
    }

    /// A uniformly coloured image.
    pub fn filled(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let data = bgr.iter().copied().cycle().take(pixels * CHANNELS).collect();
        Self { data, width, height }
    }

    /// Read and decode an image file in any format the `image` crate understands.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FrameError> {
        let bytes = std::fs::read(path).map_err(image::ImageError::IoError)?;
        Self::decode(&bytes)
    }

    /// Decode an encoded image (PNG, JPEG, ...) held in memory.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let rgb = image::load_from_memory(bytes)?.to_rgb8();
        Ok(Self::from_rgb(&rgb))
    }

    pub fn from_rgb(rgb: &RgbImage) -> Self {
        let mut data = rgb.as_raw().clone();
        swap_red_blue(&mut data);
        Self {
            data,
            width: rgb.width(),
            height: rgb.height(),
        }
    }

    /// Convert to RGB channel order.
    pub fn to_rgb(&self) -> RgbImage {
        let mut data = self.data.clone();
        swap_red_blue(&mut data);
        // Length was validated at construction, so from_raw cannot fail.
        RgbImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// BGR triple at `(x, y)`, or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let off = self.offset(x, y);
        Some([self.data[off], self.data[off + 1], self.data[off + 2]])
    }

    /// Copy out the region covered by `bbox`, clipped to the image.
    ///
    /// Returns `None` when the clipped region has zero area.
    pub fn crop(&self, bbox: &BoundingBox) -> Option<BgrImage> {
        let x0 = (bbox.x.round().max(0.0) as u32).min(self.width);
        let y0 = (bbox.y.round().max(0.0) as u32).min(self.height);
        let x1 = ((bbox.x + bbox.width).round().max(0.0) as u32).min(self.width);
        let y1 = ((bbox.y + bbox.height).round().max(0.0) as u32).min(self.height);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        let (w, h) = (x1 - x0, y1 - y0);
        let mut data = Vec::with_capacity(w as usize * h as usize * CHANNELS);
        for y in y0..y1 {
            let start = self.offset(x0, y);
            let end = start + w as usize * CHANNELS;
            data.extend_from_slice(&self.data[start..end]);
        }

        Some(BgrImage {
            data,
            width: w,
            height: h,
        })
    }

    /// Flip left-to-right in place, so the preview behaves like a mirror.
    pub fn mirror(&mut self) {
        let row_len = self.width as usize * CHANNELS;
        for row in self.data.chunks_exact_mut(row_len) {
            let w = self.width as usize;
            for x in 0..w / 2 {
                let (a, b) = (x * CHANNELS, (w - 1 - x) * CHANNELS);
                for c in 0..CHANNELS {
                    row.swap(a + c, b + c);
                }
            }
        }
    }

    /// Encode as PNG (the format reference images are stored in).
    pub fn encode_png(&self) -> Result<Vec<u8>, FrameError> {
        encode_png(&self.to_rgb())
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * CHANNELS
    }
}

/// PNG-encode an RGB image.
pub fn encode_png(rgb: &RgbImage) -> Result<Vec<u8>, FrameError> {
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

fn swap_red_blue(data: &mut [u8]) {
    for px in data.chunks_exact_mut(CHANNELS) {
        px.swap(0, 2);
    }
}
