//! Filesystem persistence for generated artifacts.
//!
//! [`artifact::ArtifactStore`] owns the flat output directory,
//! [`provenance`] is the only code that touches an artifact's metadata
//! container, and [`gallery`] composes the two into the ordered listing
//! the presentation layer renders.

pub mod artifact;
pub mod gallery;
pub mod provenance;

pub use artifact::{ArtifactEntry, ArtifactStore, StoreError};
pub use gallery::GalleryEntry;
pub use provenance::ProvenanceError;
