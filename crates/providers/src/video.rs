//! Asynchronous video assembly jobs.
//!
//! Jobs are submitted with presigned URLs of their inputs and polled
//! until the provider reports a terminal [`RemoteJobStatus`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use storyreel_core::polling::RemoteJobStatus;

use crate::http::JsonApi;
use crate::{ProviderError, ProviderResult};

/// One still image shown while one audio clip plays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClipSegment {
    pub image_url: String,
    pub audio_url: String,
    /// Offset within the clip.
    pub start_ms: i64,
    pub duration_ms: i64,
}

/// What the provider is asked to assemble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VideoJobRequest {
    /// Render one narration clip with burned-in captions.
    NarrationClip {
        sequence: i32,
        segments: Vec<ClipSegment>,
        /// SubRip captions in clip-local time.
        captions_srt: String,
    },
    /// Concatenate finished videos in the given order.
    Concatenate { inputs: Vec<String> },
}

#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Submit a job and return the provider's job id.
    async fn submit_job(&self, request: &VideoJobRequest) -> ProviderResult<String>;

    async fn poll_status(&self, job_id: &str) -> ProviderResult<RemoteJobStatus>;

    /// Download the rendered output of a completed job.
    async fn fetch_output(&self, output_locator: &str) -> ProviderResult<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Client for a render service exposing `POST /jobs` and `GET /jobs/{id}`.
pub struct HttpVideoProvider {
    api: JsonApi,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
}

impl HttpVideoProvider {
    pub fn new(api: JsonApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl VideoProvider for HttpVideoProvider {
    async fn submit_job(&self, request: &VideoJobRequest) -> ProviderResult<String> {
        let response: SubmitResponse = self.api.post_json("jobs", request).await?;
        if response.job_id.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "Render service returned an empty job id".into(),
            ));
        }
        Ok(response.job_id)
    }

    async fn poll_status(&self, job_id: &str) -> ProviderResult<RemoteJobStatus> {
        self.api.get_json(&format!("jobs/{job_id}")).await
    }

    async fn fetch_output(&self, output_locator: &str) -> ProviderResult<Vec<u8>> {
        let url = if output_locator.starts_with("http://") || output_locator.starts_with("https://")
        {
            output_locator.to_string()
        } else {
            self.api.url(output_locator)
        };
        self.api.get_bytes(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_tagged_by_kind() {
        let request = VideoJobRequest::Concatenate {
            inputs: vec!["https://cdn/a.mp4".into(), "https://cdn/outro.mp4".into()],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["kind"], "concatenate");
        assert_eq!(value["inputs"][1], "https://cdn/outro.mp4");
    }

    #[test]
    fn status_payloads_decode() {
        let status: RemoteJobStatus = serde_json::from_str(
            r#"{"status":"completed","output_locator":"outputs/42.mp4"}"#,
        )
        .unwrap();
        assert_eq!(
            status,
            RemoteJobStatus::Completed {
                output_locator: "outputs/42.mp4".into()
            }
        );
        let status: RemoteJobStatus = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        assert_eq!(status, RemoteJobStatus::Queued);
    }
}
