//! Model variant identifiers.

use crate::error::CoreError;

/// A named backend model configuration.
///
/// Each variant accepts a different option set (see [`crate::schema`]) and
/// maps to a distinct remote model identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelVariant {
    /// High-fidelity model. Slowest, most controllable.
    Pro,
    /// Developer model. Guided generation, accepts a reference image.
    Dev,
    /// Fast model. Fewest knobs, cheapest.
    Schnell,
}

/// All known variants, in display order.
pub const ALL_VARIANTS: &[ModelVariant] =
    &[ModelVariant::Pro, ModelVariant::Dev, ModelVariant::Schnell];

impl ModelVariant {
    /// Wire name used in provenance records and remote model ids.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pro => "pro",
            Self::Dev => "dev",
            Self::Schnell => "schnell",
        }
    }

    /// Parse from the wire name.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "pro" => Ok(Self::Pro),
            "dev" => Ok(Self::Dev),
            "schnell" => Ok(Self::Schnell),
            other => Err(CoreError::Validation(format!(
                "Unknown model variant '{other}'. Must be one of: pro, dev, schnell"
            ))),
        }
    }

    /// Fully-qualified remote model identifier.
    pub fn model_id(self) -> String {
        format!("black-forest-labs/flux-{}", self.as_str())
    }

    /// Whether this variant accepts a reference image input.
    pub fn accepts_reference_image(self) -> bool {
        matches!(self, Self::Dev)
    }
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
