//! The backend capability boundary.
//!
//! [`BackendAdapter`] is everything the pipeline knows about remote
//! model services: generate, upscale, face-swap, and fetching result
//! bytes. [`ReplicateBackend`] is the production implementation; tests
//! substitute their own.

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{Map, Value};

use atelier_core::ModelVariant;

use crate::api::{ReplicateApi, ReplicateApiError};

/// Pinned CodeFormer version used for upscaling.
const CODEFORMER_VERSION: &str =
    "7de2ea26c616d5bf2245ad0d5e24f0ff9a6204578a5c876db53142edd9d2cd56";

/// Pinned face-swap model version.
const FACE_SWAP_VERSION: &str =
    "cff87316e31787df12002c9e20a78a017a36cb31fde9862d8dedd15ab29b7288";

/// Upscale factor passed to CodeFormer.
const UPSCALE_FACTOR: u32 = 2;

/// CodeFormer fidelity knob (higher preserves identity over quality).
const CODEFORMER_FIDELITY: f64 = 0.98;

/// Errors crossing the backend boundary.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Transport or API failure from the REST layer.
    #[error(transparent)]
    Api(#[from] ReplicateApiError),

    /// The backend answered with a shape the adapter cannot interpret.
    #[error("Unexpected backend response: {0}")]
    Protocol(String),
}

/// The external service boundary for generation capabilities.
///
/// `generate` returns one or more result locations to be fetched;
/// `upscale` transforms bytes in place; `swap_face` returns a new
/// result location. All failures are typed — callers decide which are
/// terminal.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Run the variant's model with a validated property map.
    ///
    /// The returned sequence is normalized: non-empty, ordered as the
    /// backend produced it, whether the backend answered with a single
    /// location or a list.
    async fn generate(
        &self,
        variant: ModelVariant,
        properties: &Map<String, Value>,
    ) -> Result<Vec<String>, BackendError>;

    /// Upscale raw image bytes, returning the replacement bytes.
    async fn upscale(&self, image: &[u8]) -> Result<Vec<u8>, BackendError>;

    /// Swap `face` onto `target`, returning a result location.
    async fn swap_face(&self, face: &[u8], target: &[u8]) -> Result<String, BackendError>;

    /// Download the bytes behind a result location.
    async fn fetch(&self, location: &str) -> Result<Vec<u8>, BackendError>;
}

/// Production adapter over the Replicate API.
pub struct ReplicateBackend {
    api: ReplicateApi,
}

impl ReplicateBackend {
    pub fn new(api: ReplicateApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl BackendAdapter for ReplicateBackend {
    async fn generate(
        &self,
        variant: ModelVariant,
        properties: &Map<String, Value>,
    ) -> Result<Vec<String>, BackendError> {
        let input = Value::Object(properties.clone());
        let output = self.api.run_model(&variant.model_id(), &input).await?;
        let locations = normalize_locations(output)?;
        tracing::info!(
            variant = %variant,
            count = locations.len(),
            "Generation dispatched",
        );
        Ok(locations)
    }

    async fn upscale(&self, image: &[u8]) -> Result<Vec<u8>, BackendError> {
        let input = serde_json::json!({
            "image": data_uri("image/png", image),
            "upscale": UPSCALE_FACTOR,
            "face_upsample": false,
            "background_enhance": false,
            "codeformer_fidelity": CODEFORMER_FIDELITY,
        });

        let output = self.api.run_version(CODEFORMER_VERSION, &input).await?;
        let location = output
            .as_str()
            .ok_or_else(|| BackendError::Protocol(format!("upscale output was not a URL: {output}")))?;
        Ok(self.api.fetch_bytes(location).await?)
    }

    async fn swap_face(&self, face: &[u8], target: &[u8]) -> Result<String, BackendError> {
        let input = serde_json::json!({
            "local_source": data_uri("image/jpeg", face),
            "local_target": data_uri("image/jpeg", target),
            "weight": 0.5,
            "cache_days": 1,
            "det_thresh": 0.1,
            "request_id": "",
        });

        let output = self.api.run_version(FACE_SWAP_VERSION, &input).await?;
        swap_result_location(output)
    }

    async fn fetch(&self, location: &str) -> Result<Vec<u8>, BackendError> {
        Ok(self.api.fetch_bytes(location).await?)
    }
}

/// Encode bytes as a base64 data URI.
fn data_uri(media_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{media_type};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Normalize a generation output to a non-empty ordered location list.
///
/// Some models answer with one URL string, others with a list.
fn normalize_locations(output: Value) -> Result<Vec<String>, BackendError> {
    let locations: Vec<String> = match output {
        Value::String(url) => vec![url],
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(url) => Ok(url),
                other => Err(BackendError::Protocol(format!(
                    "generation output list held a non-URL entry: {other}"
                ))),
            })
            .collect::<Result<_, _>>()?,
        other => {
            return Err(BackendError::Protocol(format!(
                "generation output was neither a URL nor a list: {other}"
            )));
        }
    };
    if locations.is_empty() {
        return Err(BackendError::Protocol(
            "generation output was an empty list".to_string(),
        ));
    }
    Ok(locations)
}

/// Interpret the face-swap response envelope (`{code, image}`).
fn swap_result_location(output: Value) -> Result<String, BackendError> {
    let code = output.get("code").and_then(Value::as_i64);
    if code != Some(200) {
        return Err(BackendError::Protocol(format!(
            "face swap answered with code {code:?}"
        )));
    }
    output
        .get("image")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BackendError::Protocol("face swap response had no image URL".to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
