//! neuraface-hw: camera access for the capture loop.
//!
//! Frames come out of V4L2 as YUYV or GREY and are handed to the
//! recognition pipeline as packed BGR.

pub mod camera;
pub mod frame;

pub use camera::{device_path_for_index, Camera, CameraError, CameraSlot, PixelFormat};
pub use frame::Frame;
