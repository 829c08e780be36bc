//! Provider endpoints and credentials loaded from the environment.

use std::time::Duration;

use crate::{ProviderError, ProviderResult};

const DEFAULT_LLM_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TTS_MODEL: &str = "tts-1";
const DEFAULT_TTS_VOICE: &str = "alloy";
const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
const DEFAULT_IMAGE_SIZE: &str = "1024x1792";
const DEFAULT_VIDEO_API_URL: &str = "http://localhost:8090";
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 120;

/// Configuration for every generative provider.
///
/// The speech and image endpoints default to the LLM endpoint and share
/// its API key; they are usually the same OpenAI-compatible account.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub llm_api_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub tts_api_url: String,
    pub tts_voice: String,
    pub tts_model: String,
    pub image_api_url: String,
    pub image_model: String,
    /// `WIDTHxHEIGHT` requested from the image model.
    pub image_size: String,
    pub video_api_url: String,
    pub video_api_key: Option<String>,
    /// Per-request timeout for every provider call.
    pub request_timeout: Duration,
}

impl ProviderConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                      |
    /// |--------------------------|------------------------------|
    /// | `LLM_API_URL`            | `https://api.openai.com/v1`  |
    /// | `LLM_API_KEY`            | none                         |
    /// | `LLM_MODEL`              | `gpt-4o-mini`                |
    /// | `TTS_API_URL`            | `LLM_API_URL`                |
    /// | `TTS_VOICE`              | `alloy`                      |
    /// | `TTS_MODEL`              | `tts-1`                      |
    /// | `IMAGE_API_URL`          | `LLM_API_URL`                |
    /// | `IMAGE_MODEL`            | `dall-e-3`                   |
    /// | `IMAGE_SIZE`             | `1024x1792`                  |
    /// | `VIDEO_API_URL`          | `http://localhost:8090`      |
    /// | `VIDEO_API_KEY`          | none                         |
    /// | `PROVIDER_TIMEOUT_SECS`  | `120`                        |
    pub fn from_env() -> Self {
        let var = |name: &str, default: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let secret = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let llm_api_url = var("LLM_API_URL", DEFAULT_LLM_API_URL);
        Self {
            tts_api_url: var("TTS_API_URL", &llm_api_url),
            image_api_url: var("IMAGE_API_URL", &llm_api_url),
            llm_api_key: secret("LLM_API_KEY"),
            llm_model: var("LLM_MODEL", DEFAULT_LLM_MODEL),
            tts_voice: var("TTS_VOICE", DEFAULT_TTS_VOICE),
            tts_model: var("TTS_MODEL", DEFAULT_TTS_MODEL),
            image_model: var("IMAGE_MODEL", DEFAULT_IMAGE_MODEL),
            image_size: var("IMAGE_SIZE", DEFAULT_IMAGE_SIZE),
            video_api_url: var("VIDEO_API_URL", DEFAULT_VIDEO_API_URL),
            video_api_key: secret("VIDEO_API_KEY"),
            request_timeout: Duration::from_secs(
                std::env::var("PROVIDER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_PROVIDER_TIMEOUT_SECS),
            ),
            llm_api_url,
        }
    }

    /// Shared HTTP client honouring the configured timeout.
    pub fn http_client(&self) -> ProviderResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| ProviderError::Config(format!("Failed to build HTTP client: {e}")))
    }
}
