//! Pure domain logic for the generation pipeline: model variants, option
//! schemas, request building, and the provenance record.
//!
//! Nothing in this crate performs network I/O. The only filesystem access
//! is reading a caller-supplied reference image during request building.

pub mod error;
pub mod provenance;
pub mod request;
pub mod schema;
pub mod types;

pub use error::CoreError;
pub use provenance::ProvenanceRecord;
pub use request::GenerationRequest;
pub use types::ModelVariant;
