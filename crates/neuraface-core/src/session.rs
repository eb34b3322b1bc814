//! Recognition session: the scan / lock / accept state machine.
//!
//! ```text
//! Scanning --(exactly one known face)--> Locked --(confirm)--> Accepted
//!    ^   \--(two or more known faces: warn, stay)               |
//!    +------------------(recapture)-----------------------------+
//! ```
//!
//! Matching never writes state; `confirm` is the only attendance write.

use crate::bgr::BgrImage;
use crate::extractor::{EmbeddingExtractor, FaceDetect, FaceEmbed};
use crate::index::EmbeddingIndex;
use crate::matcher::{EuclideanMatcher, FrameVerdict, MatchError, Matcher};
use crate::types::{DetectionResult, Identity};
use thiserror::Error;

/// Where confirmed attendance is written.
pub trait AttendanceLedger {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Mark `student_id` present today. Must be idempotent per day.
    fn mark_present(&mut self, student_id: &str) -> Result<(), Self::Error>;
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no students are registered; register at least one student to continue")]
    EmptyIndex,
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
    #[error("matching failed: {0}")]
    Match(#[from] MatchError),
    #[error("attendance could not be saved: {0}")]
    Ledger(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// The identity held while locked.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognized {
    pub student_id: String,
    pub name: String,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Scanning,
    Locked(Recognized),
    Accepted(Recognized),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Scanning => "scanning",
            SessionState::Locked(_) => "locked",
            SessionState::Accepted(_) => "accepted",
        }
    }
}

/// What one processed frame contained.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub detections: Vec<DetectionResult>,
    pub verdict: FrameVerdict,
}

impl FrameReport {
    /// Two or more known faces; the host should warn the user.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self.verdict, FrameVerdict::Ambiguous { .. })
    }
}

/// Run detection, embedding and matching over every face in one frame.
///
/// Faces whose embedding fails are skipped.
pub fn recognize_frame<D, E, M>(
    frame: &BgrImage,
    extractor: &mut EmbeddingExtractor<D, E>,
    index: &EmbeddingIndex,
    matcher: &M,
) -> Result<Vec<DetectionResult>, MatchError>
where
    D: FaceDetect,
    E: FaceEmbed,
    M: Matcher,
{
    let mut results = Vec::new();

    for face in extractor.detect_all(frame) {
        let embedding = match extractor.get_embedding(&face.image) {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::debug!(error = %e, "skipping face without embedding");
                continue;
            }
        };

        let matched = matcher.compare(&embedding, index)?;
        results.push(DetectionResult {
            bbox: face.bbox,
            identity: matched.identity,
            distance: matched.distance,
        });
    }

    Ok(results)
}

/// One recognition session over a fixed, read-only embedding index.
pub struct RecognitionSession<M = EuclideanMatcher> {
    index: EmbeddingIndex,
    matcher: M,
    state: SessionState,
}

impl<M: Matcher> RecognitionSession<M> {
    /// Enter `Scanning`. Fails when no students are enrolled.
    pub fn start(index: EmbeddingIndex, matcher: M) -> Result<Self, SessionError> {
        if index.is_empty() {
            return Err(SessionError::EmptyIndex);
        }
        tracing::info!(students = index.len(), dimension = index.dimension(), "recognition session started");
        Ok(Self {
            index,
            matcher,
            state: SessionState::Scanning,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Whether the host should keep pulling frames.
    pub fn is_capturing(&self) -> bool {
        self.state == SessionState::Scanning
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    /// Recognise one frame and lock if exactly one known face is present.
    pub fn process_frame<D, E>(
        &mut self,
        frame: &BgrImage,
        extractor: &mut EmbeddingExtractor<D, E>,
    ) -> Result<FrameReport, SessionError>
    where
        D: FaceDetect,
        E: FaceEmbed,
    {
        if !self.is_capturing() {
            return Err(self.invalid("process a frame"));
        }

        let detections = recognize_frame(frame, extractor, &self.index, &self.matcher)?;
        let verdict = FrameVerdict::classify(&detections);

        match verdict {
            FrameVerdict::Single(i) => {
                if let Identity::Known { student_id, name } = &detections[i].identity {
                    let distance = detections[i].distance;
                    tracing::info!(student_id = %student_id, name = %name, distance, "face locked");
                    self.state = SessionState::Locked(Recognized {
                        student_id: student_id.clone(),
                        name: name.clone(),
                        distance,
                    });
                }
            }
            FrameVerdict::Ambiguous { known } => {
                tracing::debug!(known, "more than one known face in frame; not locking");
            }
            FrameVerdict::NoKnownFace => {}
        }

        Ok(FrameReport { detections, verdict })
    }

    /// Commit attendance for the locked identity.
    ///
    /// On a ledger failure the session stays locked so the write can be retried.
    pub fn confirm<L: AttendanceLedger>(&mut self, ledger: &mut L) -> Result<Recognized, SessionError> {
        let SessionState::Locked(locked) = &self.state else {
            return Err(self.invalid("confirm"));
        };

        ledger
            .mark_present(&locked.student_id)
            .map_err(|e| SessionError::Ledger(Box::new(e)))?;

        let recognized = locked.clone();
        tracing::info!(student_id = %recognized.student_id, "attendance recorded");
        self.state = SessionState::Accepted(recognized.clone());
        Ok(recognized)
    }

    /// Drop any held identity and resume scanning.
    pub fn recapture(&mut self) {
        if self.state != SessionState::Scanning {
            tracing::debug!(from = self.state.name(), "recapture");
        }
        self.state = SessionState::Scanning;
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            action,
            state: self.state.name(),
        }
    }
}
