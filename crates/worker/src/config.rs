use std::path::PathBuf;

use atelier_replicate::DEFAULT_API_URL;

/// Worker configuration loaded from environment variables.
///
/// All fields except the API token have defaults suitable for local
/// use.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Replicate API token (required).
    pub api_token: String,
    /// Replicate API base URL.
    pub api_url: String,
    /// Directory artifacts are written to.
    pub output_dir: PathBuf,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default                     |
    /// |-----------------------|-----------------------------|
    /// | `REPLICATE_API_TOKEN` | (required)                  |
    /// | `ATELIER_API_URL`     | `https://api.replicate.com` |
    /// | `ATELIER_OUTPUT_DIR`  | `results`                   |
    pub fn from_env() -> Self {
        let api_token =
            std::env::var("REPLICATE_API_TOKEN").expect("REPLICATE_API_TOKEN must be set");

        let api_url =
            std::env::var("ATELIER_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());

        let output_dir: PathBuf = std::env::var("ATELIER_OUTPUT_DIR")
            .unwrap_or_else(|_| "results".into())
            .into();

        Self {
            api_token,
            api_url,
            output_dir,
        }
    }
}
