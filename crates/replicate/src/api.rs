//! REST client for the Replicate HTTP endpoints.
//!
//! Wraps prediction submission (blocking mode via `Prefer: wait`) and
//! raw result retrieval using [`reqwest`]. The adapter layer in
//! [`crate::adapter`] interprets the returned `output` values; this
//! module only moves JSON and bytes.

use serde::Deserialize;
use serde_json::Value;

/// Default public API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.replicate.com";

/// HTTP client for the Replicate API.
pub struct ReplicateApi {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

/// Response body of a prediction request.
#[derive(Debug, Deserialize)]
pub struct PredictionResponse {
    /// Lifecycle status: `starting`, `processing`, `succeeded`, `failed`,
    /// `canceled`.
    pub status: String,
    /// Model output. Shape is model-specific (string, list, object).
    #[serde(default)]
    pub output: Option<Value>,
    /// Failure detail when `status` is `failed`.
    #[serde(default)]
    pub error: Option<Value>,
}

/// Errors from the Replicate REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ReplicateApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Replicate returned a non-2xx status code.
    #[error("Replicate API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The prediction ran but did not produce usable output.
    #[error("Prediction failed: {0}")]
    Prediction(String),
}

impl ReplicateApi {
    /// Create a new API client.
    ///
    /// * `api_url` - base URL, e.g. `https://api.replicate.com`.
    /// * `token`   - API token sent as a bearer credential.
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            token: token.into(),
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            token: token.into(),
        }
    }

    /// Run a named model and wait for its output.
    ///
    /// Sends `POST /v1/models/{model}/predictions` with `Prefer: wait`,
    /// so the response carries the finished prediction.
    pub async fn run_model(
        &self,
        model: &str,
        input: &Value,
    ) -> Result<Value, ReplicateApiError> {
        let url = format!("{}/v1/models/{model}/predictions", self.api_url);
        let body = serde_json::json!({ "input": input });
        self.submit(&url, &body).await
    }

    /// Run a version-pinned model and wait for its output.
    ///
    /// Sends `POST /v1/predictions` with the version hash in the body.
    pub async fn run_version(
        &self,
        version: &str,
        input: &Value,
    ) -> Result<Value, ReplicateApiError> {
        let url = format!("{}/v1/predictions", self.api_url);
        let body = serde_json::json!({ "version": version, "input": input });
        self.submit(&url, &body).await
    }

    /// Download raw bytes from a result location.
    pub async fn fetch_bytes(&self, location: &str) -> Result<Vec<u8>, ReplicateApiError> {
        let response = self.client.get(location).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    /// Submit a prediction request and unwrap its output.
    async fn submit(&self, url: &str, body: &Value) -> Result<Value, ReplicateApiError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .header("Prefer", "wait")
            .json(body)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let prediction = response.json::<PredictionResponse>().await?;
        Self::unwrap_output(prediction)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ReplicateApiError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ReplicateApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ReplicateApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Extract the output value from a finished prediction.
    fn unwrap_output(prediction: PredictionResponse) -> Result<Value, ReplicateApiError> {
        if prediction.status == "failed" || prediction.status == "canceled" {
            let detail = prediction
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| prediction.status.clone());
            return Err(ReplicateApiError::Prediction(detail));
        }
        match prediction.output {
            Some(output) if !output.is_null() => Ok(output),
            _ => Err(ReplicateApiError::Prediction(
                "prediction finished without output".to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
