//! Per-variant option schemas.
//!
//! Each model variant declares a table of [`OptionSpec`]s: the allowed
//! option keys, their kinds, numeric ranges, snap steps, and defaults.
//! The request builder consults these tables uniformly instead of
//! validating each option in its own branch, so adding a variant is a
//! data change, not a code change.

use crate::types::ModelVariant;

// ---------------------------------------------------------------------------
// Common options
// ---------------------------------------------------------------------------

/// Aspect ratios accepted by every variant.
pub const ASPECT_RATIOS: &[&str] = &[
    "16:9", "21:9", "1:1", "2:3", "3:2", "4:5", "5:4", "9:16", "9:21",
];

/// Default aspect ratio when none is supplied.
pub const DEFAULT_ASPECT_RATIO: &str = "16:9";

/// Property key under which a base64 reference image is dispatched.
pub const REFERENCE_IMAGE_KEY: &str = "image";

/// Data-URI prefix for the reference image payload.
pub const REFERENCE_IMAGE_PREFIX: &str = "data:image/png;base64,";

// ---------------------------------------------------------------------------
// Option specs
// ---------------------------------------------------------------------------

/// Declaration of a single variant-specific option.
#[derive(Debug, Clone, Copy)]
pub enum OptionSpec {
    /// A numeric option, clamped to `[min, max]` and snapped to `step`.
    ///
    /// `step >= 1` means the option is integer-valued and snaps to whole
    /// numbers; `step < 1` snaps to the nearest multiple of `step`.
    Numeric {
        name: &'static str,
        min: f64,
        max: f64,
        step: f64,
        default: f64,
    },
    /// A boolean toggle.
    Flag { name: &'static str, default: bool },
    /// A string option restricted to a fixed set of choices.
    Choice {
        name: &'static str,
        choices: &'static [&'static str],
        default: &'static str,
    },
}

impl OptionSpec {
    /// The option's property-map key.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Numeric { name, .. } | Self::Flag { name, .. } | Self::Choice { name, .. } => {
                name
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-variant tables
// ---------------------------------------------------------------------------

const PRO_SCHEMA: &[OptionSpec] = &[
    OptionSpec::Numeric {
        name: "steps",
        min: 1.0,
        max: 50.0,
        step: 1.0,
        default: 25.0,
    },
    OptionSpec::Numeric {
        name: "guidance",
        min: 2.0,
        max: 5.0,
        step: 0.1,
        default: 3.0,
    },
    OptionSpec::Numeric {
        name: "interval",
        min: 1.0,
        max: 4.0,
        step: 0.1,
        default: 2.0,
    },
    OptionSpec::Numeric {
        name: "safety_tolerance",
        min: 1.0,
        max: 5.0,
        step: 1.0,
        default: 5.0,
    },
];

const DEV_SCHEMA: &[OptionSpec] = &[
    OptionSpec::Numeric {
        name: "guidance",
        min: 0.0,
        max: 10.0,
        step: 0.1,
        default: 3.5,
    },
    OptionSpec::Numeric {
        name: "num_outputs",
        min: 1.0,
        max: 4.0,
        step: 1.0,
        default: 1.0,
    },
    OptionSpec::Numeric {
        name: "output_quality",
        min: 0.0,
        max: 100.0,
        step: 1.0,
        default: 80.0,
    },
    OptionSpec::Numeric {
        name: "prompt_strength",
        min: 0.0,
        max: 1.0,
        step: 0.01,
        default: 0.8,
    },
    OptionSpec::Numeric {
        name: "num_inference_steps",
        min: 1.0,
        max: 50.0,
        step: 1.0,
        default: 50.0,
    },
    OptionSpec::Choice {
        name: "output_format",
        choices: &["webp", "jpg", "png"],
        default: "jpg",
    },
    OptionSpec::Flag {
        name: "disable_safety_checker",
        default: true,
    },
];

const SCHNELL_SCHEMA: &[OptionSpec] = &[
    OptionSpec::Numeric {
        name: "num_outputs",
        min: 1.0,
        max: 4.0,
        step: 1.0,
        default: 1.0,
    },
    OptionSpec::Numeric {
        name: "output_quality",
        min: 0.0,
        max: 100.0,
        step: 1.0,
        default: 80.0,
    },
    OptionSpec::Choice {
        name: "output_format",
        choices: &["webp", "jpg", "png"],
        default: "jpg",
    },
    OptionSpec::Flag {
        name: "disable_safety_checker",
        default: true,
    },
];

/// The option table for a variant.
pub fn variant_schema(variant: ModelVariant) -> &'static [OptionSpec] {
    match variant {
        ModelVariant::Pro => PRO_SCHEMA,
        ModelVariant::Dev => DEV_SCHEMA,
        ModelVariant::Schnell => SCHNELL_SCHEMA,
    }
}

/// Look up a single option spec by key.
pub fn find_option(variant: ModelVariant, name: &str) -> Option<&'static OptionSpec> {
    variant_schema(variant).iter().find(|s| s.name() == name)
}

// ---------------------------------------------------------------------------
// Clamp and snap
// ---------------------------------------------------------------------------

/// Clamp `value` to `[min, max]`, then snap it to the option's step.
///
/// `step >= 1` rounds to the nearest whole number; `step < 1` rounds to
/// the nearest multiple of `step`. Sub-unit results are tidied to six
/// decimal places so snapped values serialize cleanly.
pub fn clamp_and_snap(value: f64, min: f64, max: f64, step: f64) -> f64 {
    let clamped = value.clamp(min, max);
    if step >= 1.0 {
        clamped.round()
    } else {
        let snapped = (clamped / step).round() * step;
        (snapped * 1e6).round() / 1e6
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
