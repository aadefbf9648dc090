//! Request building: unified parameters in, backend property map out.
//!
//! [`GenerationRequest`] carries the user-facing parameter set;
//! [`GenerationRequest::build_properties`] validates it against the
//! variant's schema and produces the exact property map a backend
//! adapter expects. The builder knows nothing about transport.

use std::collections::BTreeMap;
use std::path::PathBuf;

use base64::Engine as _;
use rand::Rng as _;
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::schema::{
    clamp_and_snap, variant_schema, OptionSpec, ASPECT_RATIOS, DEFAULT_ASPECT_RATIO,
    REFERENCE_IMAGE_KEY, REFERENCE_IMAGE_PREFIX,
};
use crate::types::ModelVariant;

/// Property-map keys owned by the builder itself. Variant options may not
/// shadow these.
const RESERVED_KEYS: &[&str] = &["prompt", "seed", "aspect_ratio", "upscale", REFERENCE_IMAGE_KEY];

/// A unified generation request, independent of any backend's wire format.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub variant: ModelVariant,
    pub prompt: String,
    /// Common option, validated against [`ASPECT_RATIOS`].
    pub aspect_ratio: String,
    /// Common option: run the upscale stage after generation.
    pub upscale: bool,
    /// Explicit seed. Ignored when `randomize_seed` is set.
    pub seed: Option<u32>,
    /// Draw a fresh 32-bit seed at build time, overwriting `seed`.
    pub randomize_seed: bool,
    /// Variant-specific overrides; schema defaults fill the rest.
    pub options: BTreeMap<String, Value>,
    /// Optional reference image path (variants that accept one only).
    pub reference_image: Option<PathBuf>,
}

impl GenerationRequest {
    /// A request with schema defaults for everything but the prompt.
    pub fn new(variant: ModelVariant, prompt: impl Into<String>) -> Self {
        Self {
            variant,
            prompt: prompt.into(),
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            upscale: false,
            seed: None,
            randomize_seed: true,
            options: BTreeMap::new(),
            reference_image: None,
        }
    }

    /// Override a single variant-specific option.
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Build the validated property map dispatched to the backend.
    ///
    /// - Unknown variant-option keys are rejected.
    /// - Numeric options are clamped to their range, then snapped to
    ///   their step.
    /// - The seed is the explicit one, or a fresh random 32-bit value
    ///   when `randomize_seed` is set (or no seed was given).
    /// - A reference image, if supplied and supported, is read from disk
    ///   and embedded as a base64 data URI; a missing file fails here,
    ///   before any dispatch.
    pub fn build_properties(&self) -> Result<Map<String, Value>, CoreError> {
        if !ASPECT_RATIOS.contains(&self.aspect_ratio.as_str()) {
            return Err(CoreError::OutOfRange {
                option: "aspect_ratio".into(),
                detail: format!(
                    "'{}' is not one of: {}",
                    self.aspect_ratio,
                    ASPECT_RATIOS.join(", ")
                ),
            });
        }

        let schema = variant_schema(self.variant);
        for key in self.options.keys() {
            let known = schema.iter().any(|s| s.name() == key);
            if !known || RESERVED_KEYS.contains(&key.as_str()) {
                return Err(CoreError::UnknownOption {
                    option: key.clone(),
                    variant: self.variant.as_str(),
                });
            }
        }

        let seed: u32 = if self.randomize_seed {
            rand::rng().random()
        } else {
            match self.seed {
                Some(seed) => seed,
                // No explicit seed to pass through; the dispatched map
                // always carries a concrete one.
                None => rand::rng().random(),
            }
        };

        let mut properties = Map::new();
        properties.insert("prompt".into(), Value::from(self.prompt.clone()));
        properties.insert("seed".into(), Value::from(seed));
        properties.insert("aspect_ratio".into(), Value::from(self.aspect_ratio.clone()));
        properties.insert("upscale".into(), Value::from(self.upscale));

        for spec in schema {
            let supplied = self.options.get(spec.name());
            let value = resolve_option(spec, supplied)?;
            properties.insert(spec.name().into(), value);
        }

        if let Some(path) = &self.reference_image {
            if !self.variant.accepts_reference_image() {
                return Err(CoreError::Validation(format!(
                    "Model variant '{}' does not accept a reference image",
                    self.variant
                )));
            }
            let bytes = std::fs::read(path).map_err(|_| CoreError::InputNotFound {
                path: path.display().to_string(),
            })?;
            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
            properties.insert(
                REFERENCE_IMAGE_KEY.into(),
                Value::from(format!("{REFERENCE_IMAGE_PREFIX}{encoded}")),
            );
        }

        Ok(properties)
    }
}

/// Validate one supplied (or defaulted) option value against its spec.
fn resolve_option(spec: &OptionSpec, supplied: Option<&Value>) -> Result<Value, CoreError> {
    match spec {
        OptionSpec::Numeric {
            name,
            min,
            max,
            step,
            default,
        } => {
            let raw = match supplied {
                Some(value) => value.as_f64().ok_or_else(|| CoreError::Validation(format!(
                    "Option '{name}' must be a number"
                )))?,
                None => *default,
            };
            let snapped = clamp_and_snap(raw, *min, *max, *step);
            if *step >= 1.0 {
                Ok(Value::from(snapped as i64))
            } else {
                Ok(Value::from(snapped))
            }
        }
        OptionSpec::Flag { name, default } => match supplied {
            Some(Value::Bool(flag)) => Ok(Value::from(*flag)),
            Some(_) => Err(CoreError::Validation(format!(
                "Option '{name}' must be a boolean"
            ))),
            None => Ok(Value::from(*default)),
        },
        OptionSpec::Choice {
            name,
            choices,
            default,
        } => {
            let raw = match supplied {
                Some(value) => value.as_str().ok_or_else(|| CoreError::Validation(format!(
                    "Option '{name}' must be a string"
                )))?,
                None => default,
            };
            if !choices.contains(&raw) {
                return Err(CoreError::OutOfRange {
                    option: name.to_string(),
                    detail: format!("'{raw}' is not one of: {}", choices.join(", ")),
                });
            }
            Ok(Value::from(raw))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
