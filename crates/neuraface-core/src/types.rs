use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("embedding blob of {0} bytes is not a whole number of f32 values")]
pub struct EmbeddingBytesError(pub usize);

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean (L2) distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        l2_distance(&self.values, &other.values)
    }

    /// Raw little-endian f32 bytes, `dimension * 4` long.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, EmbeddingBytesError> {
        if bytes.len() % 4 != 0 {
            return Err(EmbeddingBytesError(bytes.len()));
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { values })
    }
}

pub(crate) fn l2_distance<'a>(
    a: impl IntoIterator<Item = &'a f32>,
    b: impl IntoIterator<Item = &'a f32>,
) -> f32 {
    a.into_iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Who a face belongs to. `Unknown` is a distinct case, never a sentinel id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Known { student_id: String, name: String },
    Unknown,
}

impl Identity {
    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known { .. })
    }

    /// Label for overlays and logs.
    pub fn display_name(&self) -> &str {
        match self {
            Identity::Known { name, .. } => name,
            Identity::Unknown => "Unknown",
        }
    }
}

/// One face found in one frame, with its best match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub bbox: BoundingBox,
    pub identity: Identity,
    /// L2 distance to the nearest enrolled embedding.
    pub distance: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_symmetric_and_zero_on_self() {
        let a = Embedding::new(vec![1.0, -2.0, 0.5]);
        let b = Embedding::new(vec![0.0, 3.0, 2.5]);
        assert_eq!(a.euclidean_distance(&b), b.euclidean_distance(&a));
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_distance_known_value() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_le_bytes_layout() {
        let e = Embedding::new(vec![1.0, -0.5]);
        let bytes = e.to_le_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(Embedding::from_le_bytes(&bytes).unwrap(), e);
    }

    #[test]
    fn test_from_le_bytes_rejects_partial_float() {
        assert_eq!(Embedding::from_le_bytes(&[0, 0, 0]), Err(EmbeddingBytesError(3)));
    }

    #[test]
    fn test_unknown_is_not_a_student_id() {
        let real = Identity::Known { student_id: "Unknown".into(), name: "Unknown".into() };
        assert!(real.is_known());
        assert_ne!(real, Identity::Unknown);
        assert_eq!(Identity::Unknown.display_name(), "Unknown");
    }
}
