//! The generation pipeline runner.
//!
//! One [`runner::PipelineRunner`] drives one end-to-end generation at a
//! time: build request → dispatch → per-artifact fetch, persist, embed
//! provenance, optional upscale, optional face swap. Progress and the
//! final outcome report flow to the consumer as an ordered
//! [`events::PipelineEvent`] stream.

pub mod events;
pub mod outcome;
pub mod runner;

pub use events::{ArtifactStage, PipelineEvent, RunReport};
pub use outcome::{GenerationOutcome, StageError};
pub use runner::{PipelineError, PipelineRunner, RunHandle};
