//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame, FrameError};
use neuraface_core::BgrImage;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;
/// A dequeue that waits longer than this is reported as a capture failure.
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera {0} not available")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("device does not support video capture")]
    StreamingNotSupported,
    #[error("no camera is open")]
    NotOpen,
    #[error("frame conversion failed: {0}")]
    Frame(#[from] FrameError),
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, converted to BGR.
    Yuyv,
    /// 8-bit grayscale, replicated to BGR.
    Grey,
}

/// `/dev/videoN` for a numeric camera index.
pub fn device_path_for_index(index: u32) -> String {
    format!("/dev/video{index}")
}

/// V4L2 camera device handle with one long-lived mmap stream.
///
/// The stream is created at open and started on the first dequeue; it stays
/// on until the camera is dropped, so consecutive captures are consecutive
/// frames of one stream.
pub struct Camera {
    // Declared before `device` so STREAMOFF runs before the handle closes.
    stream: MmapStream<'static>,
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
    /// Flip frames left-to-right so the preview acts like a mirror.
    pub mirror: bool,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0").
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to query capabilities: {e}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        // Ask for YUYV; drivers that only do GREY will answer with that.
        let mut fmt = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to get format: {e}")))?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = REQUESTED_WIDTH;
        fmt.height = REQUESTED_HEIGHT;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to set format: {e}")))?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV or GREY)"
            )));
        };

        let mut stream = MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;
        stream.set_timeout(DEQUEUE_TIMEOUT);

        tracing::info!(
            device = device_path,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "camera opened"
        );

        Ok(Self {
            stream,
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
            mirror: true,
        })
    }

    /// Dequeue the next frame from the stream as BGR.
    pub fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let mut image = buf_to_bgr(self.pixel_format, buf, self.width, self.height)?;
        if self.mirror {
            image.mirror();
        }

        Ok(Frame {
            image,
            timestamp: std::time::Instant::now(),
            sequence: meta.sequence,
        })
    }

    /// Capture and throw away `count` frames while exposure settles.
    pub fn discard_frames(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        tracing::debug!(count, "discarding warmup frames");
        for _ in 0..count {
            if let Err(e) = self.capture_frame() {
                tracing::debug!(error = %e, "warmup frame failed");
            }
        }
    }
}

fn buf_to_bgr(format: PixelFormat, buf: &[u8], width: u32, height: u32) -> Result<BgrImage, CameraError> {
    let image = match format {
        PixelFormat::Yuyv => frame::yuyv_to_bgr(buf, width, height)?,
        PixelFormat::Grey => frame::grey_to_bgr(buf, width, height)?,
    };
    Ok(image)
}

/// Holds at most one open camera; switching releases the old handle first.
pub struct CameraSlot {
    camera: Option<Camera>,
    mirror: bool,
}

impl CameraSlot {
    /// An empty slot. `mirror` applies to every camera opened through it.
    pub fn new(mirror: bool) -> Self {
        Self { camera: None, mirror }
    }

    pub fn open(device_path: &str, mirror: bool) -> Result<Self, CameraError> {
        let mut slot = Self::new(mirror);
        slot.switch(device_path)?;
        Ok(slot)
    }

    /// Release the current camera, then open `device_path`.
    ///
    /// If the new device fails to open the slot is left empty.
    pub fn switch(&mut self, device_path: &str) -> Result<(), CameraError> {
        self.release();
        let mut camera = Camera::open(device_path)?;
        camera.mirror = self.mirror;
        self.camera = Some(camera);
        Ok(())
    }

    /// Close the camera and stop its stream, if any.
    pub fn release(&mut self) {
        if let Some(camera) = self.camera.take() {
            tracing::info!(device = %camera.device_path, "camera released");
        }
    }

    pub fn is_open(&self) -> bool {
        self.camera.is_some()
    }

    pub fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        self.camera.as_mut().ok_or(CameraError::NotOpen)?.capture_frame()
    }

    /// Let exposure settle on the open camera; a no-op when the slot is empty.
    pub fn discard_frames(&mut self, count: usize) {
        if let Some(camera) = self.camera.as_mut() {
            camera.discard_frames(count);
        }
    }
}
