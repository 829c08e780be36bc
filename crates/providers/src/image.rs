//! Text-to-image generation.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::json;

use crate::http::JsonApi;
use crate::{ProviderError, ProviderResult};

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn generate_image(&self, description: &str) -> ProviderResult<GeneratedImage>;
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// OpenAI-compatible `images/generations` client returning base64 PNG.
pub struct HttpImageProvider {
    api: JsonApi,
    model: String,
    size: String,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
}

impl HttpImageProvider {
    pub fn new(api: JsonApi, model: String, size: String) -> Self {
        Self { api, model, size }
    }
}

/// Decode a base64 image payload, accepting an optional data-URL prefix.
pub fn decode_image_payload(encoded: &str) -> ProviderResult<Vec<u8>> {
    let payload = match encoded.split_once(";base64,") {
        Some((_, data)) => data,
        None => encoded,
    };
    general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| ProviderError::InvalidResponse(format!("Invalid base64 image: {e}")))
}

#[async_trait]
impl ImageProvider for HttpImageProvider {
    async fn generate_image(&self, description: &str) -> ProviderResult<GeneratedImage> {
        let body = json!({
            "model": self.model,
            "prompt": description,
            "size": self.size,
            "n": 1,
            "response_format": "b64_json",
        });
        let response: ImagesResponse = self.api.post_json("images/generations", &body).await?;
        let encoded = response
            .data
            .into_iter()
            .next()
            .and_then(|d| d.b64_json)
            .ok_or_else(|| ProviderError::InvalidResponse("Image response has no data".into()))?;

        Ok(GeneratedImage {
            bytes: decode_image_payload(&encoded)?,
            content_type: "image/png".to_string(),
        })
    }
}
