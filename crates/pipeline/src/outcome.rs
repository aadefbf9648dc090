//! Per-artifact outcome reporting.

use std::path::PathBuf;

/// A failure local to one artifact's processing.
///
/// None of these abort the run; they are recorded on the artifact's
/// outcome and the remaining artifacts continue.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StageError {
    /// Result bytes could not be downloaded. Stops this artifact.
    #[error("Failed to fetch result: {0}")]
    Fetch(String),

    /// Artifact bytes could not be written to disk.
    #[error("Failed to persist artifact: {0}")]
    Save(String),

    /// The provenance record could not be embedded.
    #[error("Failed to embed provenance: {0}")]
    Embed(String),

    /// Best-effort upscale failed; the artifact keeps its prior bytes.
    #[error("Upscale failed: {0}")]
    Upscale(String),

    /// Best-effort face swap failed; the artifact keeps its prior bytes.
    #[error("Face swap failed: {0}")]
    FaceSwap(String),
}

/// The report for one produced artifact.
///
/// Created when a result location arrives, mutated in place as stages
/// complete or fail, and immutable once handed to the consumer.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// Deterministic artifact path, known before the first byte lands.
    pub file_path: PathBuf,

    /// Whether the artifact's bytes were replaced by an upscaled version.
    pub upscaled: bool,

    /// `Some(true)` swapped, `Some(false)` attempted and failed,
    /// `None` never attempted.
    pub face_swapped: Option<bool>,

    /// First stage failure, if any. Later best-effort failures remain
    /// visible through the flags above.
    pub error: Option<StageError>,
}

impl GenerationOutcome {
    pub fn new(file_path: PathBuf) -> Self {
        Self {
            file_path,
            upscaled: false,
            face_swapped: None,
            error: None,
        }
    }

    /// Whether every attempted stage succeeded.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Record a stage failure. The first failure wins the error slot.
    pub(crate) fn record_error(&mut self, error: StageError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_outcome_is_ok() {
        let outcome = GenerationOutcome::new(PathBuf::from("a.png"));
        assert!(outcome.is_ok());
        assert!(!outcome.upscaled);
        assert_eq!(outcome.face_swapped, None);
    }

    #[test]
    fn first_error_wins_the_slot() {
        let mut outcome = GenerationOutcome::new(PathBuf::from("a.png"));
        outcome.record_error(StageError::Upscale("timeout".into()));
        outcome.record_error(StageError::FaceSwap("late".into()));
        assert!(matches!(outcome.error, Some(StageError::Upscale(_))));
    }
}
