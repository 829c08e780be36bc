//! Generative provider contracts and their HTTP clients.
//!
//! Four collaborators produce pipeline artifacts: a structuring model
//! (chapter text to scenes and shots), speech synthesis, image
//! generation and asynchronous video assembly. Each is a trait so the
//! pipeline can run against scripted fakes; the `http` implementations
//! talk to OpenAI-style JSON endpoints with [`reqwest`].

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod http;
pub mod image;
pub mod speech;
pub mod structuring;
pub mod video;

pub use config::ProviderConfig;
pub use error::{ProviderError, ProviderResult};
pub use image::{GeneratedImage, ImageProvider};
pub use speech::{SpeechClip, SpeechProvider};
pub use structuring::{StructureRequest, StructuringProvider};
pub use video::{ClipSegment, VideoJobRequest, VideoProvider};

/// One instance of every provider the pipeline calls.
#[derive(Clone)]
pub struct ProviderSet {
    pub structuring: Arc<dyn StructuringProvider>,
    pub speech: Arc<dyn SpeechProvider>,
    pub image: Arc<dyn ImageProvider>,
    pub video: Arc<dyn VideoProvider>,
}

impl ProviderSet {
    /// Build the HTTP clients described by `config`, sharing one
    /// connection pool.
    pub fn from_config(config: &ProviderConfig) -> ProviderResult<Self> {
        let client = config.http_client()?;
        Ok(Self {
            structuring: Arc::new(structuring::HttpStructuringProvider::new(
                http::JsonApi::with_client(
                    client.clone(),
                    config.llm_api_url.clone(),
                    config.llm_api_key.clone(),
                ),
                config.llm_model.clone(),
            )),
            speech: Arc::new(speech::HttpSpeechProvider::new(
                http::JsonApi::with_client(
                    client.clone(),
                    config.tts_api_url.clone(),
                    config.llm_api_key.clone(),
                ),
                config.tts_model.clone(),
                config.tts_voice.clone(),
            )),
            image: Arc::new(image::HttpImageProvider::new(
                http::JsonApi::with_client(
                    client.clone(),
                    config.image_api_url.clone(),
                    config.llm_api_key.clone(),
                ),
                config.image_model.clone(),
                config.image_size.clone(),
            )),
            video: Arc::new(video::HttpVideoProvider::new(http::JsonApi::with_client(
                client,
                config.video_api_url.clone(),
                config.video_api_key.clone(),
            ))),
        })
    }
}
