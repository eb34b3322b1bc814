//! `neuraface register`: enroll one student from a camera still or an image file.

use crate::config::Config;
use anyhow::{bail, Context, Result};
use neuraface_core::{BgrImage, ExtractError};
use neuraface_hw::CameraSlot;
use neuraface_store::{Store, StoreError};
use std::path::Path;

/// Check the form fields before any camera or model work.
fn validate_fields(student_id: &str, name: &str) -> Result<()> {
    if student_id.trim().is_empty() || name.trim().is_empty() {
        bail!("fill all fields: both --id and --name are required");
    }
    Ok(())
}

/// Open the configured camera, let it settle, and grab one frame.
fn capture_still(config: &Config) -> Result<BgrImage> {
    let mut camera = CameraSlot::open(&config.camera_device, config.mirror)
        .with_context(|| format!("could not open camera {}", config.camera_device))?;
    camera.discard_frames(config.warmup_frames);
    let frame = camera.capture_frame().context("could not capture a frame")?;
    camera.release();
    Ok(frame.image)
}

pub fn run(config: &Config, store: &Store, student_id: &str, name: &str, image: Option<&Path>) -> Result<()> {
    validate_fields(student_id, name)?;
    let (student_id, name) = (student_id.trim(), name.trim());

    let frame = match image {
        Some(path) => BgrImage::open(path).with_context(|| format!("could not read image {}", path.display()))?,
        None => capture_still(config)?,
    };

    let mut extractor = crate::load_extractor(config)?;
    let face = match extractor.extract_face(&frame) {
        Err(ExtractError::NoFace) => bail!("no face detected; face the camera and try again"),
        other => other.context("face detection failed")?,
    };
    tracing::debug!(confidence = face.bbox.confidence, "face found for registration");

    let embedding = extractor
        .get_embedding(&face.image)
        .context("could not compute a face embedding")?;
    let png = face.image.encode_png().context("could not encode the face image")?;

    match store.save_student(student_id, name, &png, &embedding) {
        Ok(()) => {}
        Err(StoreError::DuplicateKey(id)) => {
            bail!("student id {id} is already registered; choose a different id")
        }
        Err(StoreError::MissingField(field)) => bail!("fill all fields: {field} is empty"),
        Err(e) => return Err(e).context("could not save the student"),
    }

    println!("Registered {name} ({student_id})");
    Ok(())
}
