//! The provenance record: a JSON-serializable projection of a request.
//!
//! A [`ProvenanceRecord`] is what gets embedded into a persisted
//! artifact's metadata container, and what a decoded artifact yields
//! back. It never contains the reference-image payload. The embedding
//! itself lives in the store crate; this module is the pure data model
//! plus the request round-trip.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::request::GenerationRequest;
use crate::schema::{variant_schema, DEFAULT_ASPECT_RATIO, REFERENCE_IMAGE_KEY};
use crate::types::ModelVariant;

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Self-describing generation parameters carried by an artifact.
///
/// Decoding is key-order-independent; unknown keys land in
/// `parameters`. The `upscaled` / `face_swapped` flags are only
/// serialized when meaningful, matching the container contract of
/// "present when applicable".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    /// Wire name of the model variant that produced the artifact.
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub prompt: String,

    /// Set once the artifact bytes were replaced by an upscaled version.
    #[serde(default, skip_serializing_if = "is_false")]
    pub upscaled: bool,

    /// `Some(true)` = swapped, `Some(false)` = attempted and failed,
    /// `None` = never attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_swapped: Option<bool>,

    /// Every dispatched option, common and variant-specific.
    #[serde(flatten)]
    pub parameters: BTreeMap<String, Value>,
}

impl ProvenanceRecord {
    /// Project a dispatched property map into a record.
    ///
    /// The prompt becomes a dedicated field and the reference-image
    /// payload is dropped entirely (size and privacy).
    pub fn from_properties(variant: ModelVariant, properties: &Map<String, Value>) -> Self {
        let mut parameters = BTreeMap::new();
        let mut prompt = String::new();
        for (key, value) in properties {
            match key.as_str() {
                REFERENCE_IMAGE_KEY => {}
                "prompt" => {
                    prompt = value.as_str().unwrap_or_default().to_string();
                }
                _ => {
                    parameters.insert(key.clone(), value.clone());
                }
            }
        }
        Self {
            model: variant.as_str().to_string(),
            prompt,
            upscaled: false,
            face_swapped: None,
            parameters,
        }
    }

    /// Same record with the upscaled flag set.
    pub fn upscaled(mut self) -> Self {
        self.upscaled = true;
        self
    }

    /// Same record with a face-swap attempt recorded.
    pub fn face_swapped(mut self, swapped: bool) -> Self {
        self.face_swapped = Some(swapped);
        self
    }

    /// Rebuild a request that would reproduce this artifact.
    ///
    /// The recorded seed is carried over verbatim and `randomize_seed`
    /// is forced off, so replaying the request dispatches the same
    /// parameters. Keys a newer schema no longer knows are dropped.
    pub fn to_request(&self) -> Result<GenerationRequest, CoreError> {
        let variant = ModelVariant::from_name(&self.model)?;

        let seed = self
            .parameters
            .get("seed")
            .and_then(Value::as_u64)
            .map(|s| s as u32);
        let aspect_ratio = self
            .parameters
            .get("aspect_ratio")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_ASPECT_RATIO)
            .to_string();
        let upscale = self
            .parameters
            .get("upscale")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let schema = variant_schema(variant);
        let options: BTreeMap<String, Value> = self
            .parameters
            .iter()
            .filter(|(key, _)| schema.iter().any(|s| s.name() == key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(GenerationRequest {
            variant,
            prompt: self.prompt.clone(),
            aspect_ratio,
            upscale,
            seed,
            randomize_seed: false,
            options,
            reference_image: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
