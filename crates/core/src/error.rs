/// Errors surfaced by the pure domain layer.
///
/// All of these are fail-fast: they are raised during request validation,
/// before anything is dispatched to a backend.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A caller-supplied input file does not exist or could not be read.
    #[error("Input file not found: {path}")]
    InputNotFound { path: String },

    /// An option key that is not part of the variant's schema.
    #[error("Unknown option '{option}' for model variant '{variant}'")]
    UnknownOption {
        option: String,
        variant: &'static str,
    },

    /// A non-numeric option value outside its allowed set. Numeric values
    /// are clamped rather than rejected.
    #[error("Option '{option}' is out of range: {detail}")]
    OutOfRange { option: String, detail: String },

    /// Any other request-level validation failure.
    #[error("Validation failed: {0}")]
    Validation(String),
}
