//! Nearest-neighbour matching of a query embedding against the index.

use crate::index::EmbeddingIndex;
use crate::types::{l2_distance, DetectionResult, Embedding, Identity};
use thiserror::Error;

/// Maximum L2 distance (exclusive) for two ArcFace embeddings to be the same person.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 4.0;

#[derive(Debug, Error, PartialEq)]
pub enum MatchError {
    #[error("embedding index is empty (no students enrolled)")]
    EmptyIndex,
    #[error("query embedding is {actual}-dim, index is {expected}-dim")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result of matching a query embedding against the index.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub identity: Identity,
    /// Distance to the nearest row, whether or not it cleared the threshold.
    pub distance: f32,
}

/// Strategy for comparing a query embedding against the enrolled index.
pub trait Matcher {
    fn compare(&self, query: &Embedding, index: &EmbeddingIndex) -> Result<MatchResult, MatchError>;
}

/// Brute-force L2 matcher with a fixed acceptance threshold.
///
/// Ties at the minimum distance resolve to the first row in index order.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub threshold: f32,
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(&self, query: &Embedding, index: &EmbeddingIndex) -> Result<MatchResult, MatchError> {
        if index.is_empty() {
            return Err(MatchError::EmptyIndex);
        }
        if query.dimension() != index.dimension() {
            return Err(MatchError::DimensionMismatch {
                expected: index.dimension(),
                actual: query.dimension(),
            });
        }

        let mut best_dist = f32::INFINITY;
        let mut best_idx = 0usize;

        for (i, (_, _, row)) in index.rows().enumerate() {
            let dist = l2_distance(&query.values, row.iter());
            // Strict `<` keeps the first row on ties.
            if dist < best_dist {
                best_dist = dist;
                best_idx = i;
            }
        }

        let identity = match index.row(best_idx) {
            Some((id, name, _)) if best_dist < self.threshold => Identity::Known {
                student_id: id.to_string(),
                name: name.to_string(),
            },
            _ => Identity::Unknown,
        };

        Ok(MatchResult {
            identity,
            distance: best_dist,
        })
    }
}

/// How many known faces a frame contains, and whether it can lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameVerdict {
    /// Zero known faces (unknown faces may be present).
    NoKnownFace,
    /// Exactly one known face, at this position in the frame's results.
    Single(usize),
    /// Two or more known faces at once; never auto-locks.
    Ambiguous { known: usize },
}

impl FrameVerdict {
    pub fn classify(results: &[DetectionResult]) -> Self {
        let mut known = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.identity.is_known());

        match (known.next(), known.count()) {
            (None, _) => FrameVerdict::NoKnownFace,
            (Some((i, _)), 0) => FrameVerdict::Single(i),
            (Some(_), rest) => FrameVerdict::Ambiguous { known: rest + 1 },
        }
    }
}
