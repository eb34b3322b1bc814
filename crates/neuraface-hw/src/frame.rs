//! Frame type and pixel-format conversion to BGR.

use neuraface_core::BgrImage;

/// A captured camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: BgrImage,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid {format} length: expected {expected}, got {actual}")]
    InvalidLength {
        format: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Image(#[from] neuraface_core::FrameError),
}

/// Convert packed YUYV (4:2:2) to BGR using BT.601 full-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V], sharing U and V.
pub fn yuyv_to_bgr(yuyv: &[u8], width: u32, height: u32) -> Result<BgrImage, FrameError> {
    let expected = width as usize * height as usize * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            format: "YUYV",
            expected,
            actual: yuyv.len(),
        });
    }

    let mut bgr = Vec::with_capacity(expected / 2 * 3);
    for quad in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        bgr.extend_from_slice(&yuv_to_bgr(y0, u, v));
        bgr.extend_from_slice(&yuv_to_bgr(y1, u, v));
    }

    Ok(BgrImage::new(bgr, width, height)?)
}

/// Replicate 8-bit grayscale into all three channels.
pub fn grey_to_bgr(grey: &[u8], width: u32, height: u32) -> Result<BgrImage, FrameError> {
    let pixels = width as usize * height as usize;
    if grey.len() < pixels {
        return Err(FrameError::InvalidLength {
            format: "GREY",
            expected: pixels,
            actual: grey.len(),
        });
    }

    let bgr = grey[..pixels].iter().flat_map(|&g| [g, g, g]).collect();
    Ok(BgrImage::new(bgr, width, height)?)
}

fn yuv_to_bgr(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let r = y + 1.402 * v;
    let g = y - 0.344_136 * u - 0.714_136 * v;
    let b = y + 1.772 * u;

    let clamp = |c: f32| c.round().clamp(0.0, 255.0) as u8;
    [clamp(b), clamp(g), clamp(r)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_neutral_chroma_is_grey() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        let bgr = yuyv_to_bgr(&[100, 128, 200, 128], 2, 1).unwrap();
        assert_eq!(bgr.pixel(0, 0), Some([100, 100, 100]));
        assert_eq!(bgr.pixel(1, 0), Some([200, 200, 200]));
    }

    #[test]
    fn test_yuyv_red() {
        let bgr = yuyv_to_bgr(&[76, 85, 76, 255], 2, 1).unwrap();
        assert_eq!(bgr.pixel(0, 0), Some([0, 0, 254]));
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(yuyv_to_bgr(&[100, 128], 2, 1).is_err());
    }

    #[test]
    fn test_grey_replicated() {
        let bgr = grey_to_bgr(&[10, 20, 30, 40], 2, 2).unwrap();
        assert_eq!(bgr.pixel(1, 1), Some([40, 40, 40]));
        assert!(grey_to_bgr(&[1, 2, 3], 2, 2).is_err());
    }
}
