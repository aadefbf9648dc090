//! Ordered progress events from a background run.
//!
//! Events are delivered over an unbounded `tokio::sync::mpsc` channel:
//! the run task never blocks on a slow consumer, and a single-threaded
//! consumer observes everything in emission order on its own turn.
//! Exactly one terminal event ([`PipelineEvent::Completed`] or
//! [`PipelineEvent::Failed`]) closes every run.

use std::time::Duration;

use crate::outcome::GenerationOutcome;

/// Aggregate report for one finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// One outcome per result location, in backend order.
    pub outcomes: Vec<GenerationOutcome>,
    /// Wall-clock time from dispatch to the last artifact.
    pub elapsed: Duration,
}

impl RunReport {
    /// Whether every artifact completed all attempted stages.
    pub fn fully_succeeded(&self) -> bool {
        self.outcomes.iter().all(GenerationOutcome::is_ok)
    }
}

/// Per-artifact processing stage, in execution order.
///
/// The presentation layer renders these as the artifact's busy state;
/// the optional stages are only announced when actually attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStage {
    Fetching,
    Persisting,
    EmbeddingProvenance,
    Upscaling,
    FaceSwapping,
}

impl std::fmt::Display for ArtifactStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Fetching => "fetching",
            Self::Persisting => "persisting",
            Self::EmbeddingProvenance => "embedding provenance",
            Self::Upscaling => "upscaling",
            Self::FaceSwapping => "face swapping",
        };
        f.write_str(label)
    }
}

/// One notification from a background run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// The backend accepted the request and produced result locations.
    Dispatched { artifact_count: usize },

    /// One artifact entered a processing stage.
    Stage { index: usize, stage: ArtifactStage },

    /// One artifact finished all of its stages (possibly with local
    /// failures recorded on the outcome).
    ArtifactFinished {
        index: usize,
        outcome: GenerationOutcome,
    },

    /// Terminal: the run finished. Per-artifact failures live in the
    /// report; the run itself still counts as delivered.
    Completed { report: RunReport },

    /// Terminal: dispatch failed. No artifacts were produced.
    Failed { error: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
