//! Shared harness for pipeline flow tests: in-memory store and blob
//! store plus scripted providers.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use storyreel_core::polling::{PollPolicy, RemoteJobStatus};
use storyreel_core::types::DbId;
use storyreel_db::store::MemoryStore;
use storyreel_events::EventBus;
use storyreel_pipeline::{Pipeline, PipelineConfig};
use storyreel_providers::{
    GeneratedImage, ImageProvider, ProviderError, ProviderResult, ProviderSet, SpeechClip,
    SpeechProvider, StructureRequest, StructuringProvider, VideoJobRequest, VideoProvider,
};
use storyreel_storage::memory::MemoryBlobStore;
use storyreel_storage::BlobStore;

pub const OUTRO_KEY: &str = "assets/outro.mp4";
pub const CLIP_MS: i64 = 1_200;

// ---------------------------------------------------------------------------
// Narration documents
// ---------------------------------------------------------------------------

/// Text spoken in a given shot of a generated document.
pub fn shot_text(scene: i32, shot: i32) -> String {
    format!("Line {scene}.{shot} of the story.")
}

/// A valid narration document with `scenes` scenes of `shots` shots.
pub fn narration_document(scenes: i32, shots: i32) -> String {
    let scenes: Vec<_> = (1..=scenes)
        .map(|scene| {
            let shots: Vec<_> = (1..=shots)
                .map(|shot| {
                    json!({
                        "shotNumber": shot,
                        "text": shot_text(scene, shot),
                        "visualDescription": format!("Frame {scene}.{shot}"),
                    })
                })
                .collect();
            json!({ "sceneNumber": scene, "shots": shots })
        })
        .collect();
    json!({ "scenes": scenes }).to_string()
}

// ---------------------------------------------------------------------------
// Scripted providers
// ---------------------------------------------------------------------------

pub struct ScriptedStructuring {
    pub output: Mutex<String>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl StructuringProvider for ScriptedStructuring {
    async fn structure(&self, _request: StructureRequest<'_>) -> ProviderResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.lock().unwrap().clone())
    }
}

/// Speech that rejects any text in `failing`.
pub struct ScriptedSpeech {
    pub failing: Mutex<HashSet<String>>,
    pub calls: AtomicUsize,
}

impl ScriptedSpeech {
    pub fn fail_on(&self, text: String) {
        self.failing.lock().unwrap().insert(text);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }
}

#[async_trait]
impl SpeechProvider for ScriptedSpeech {
    async fn synthesize(&self, text: &str) -> ProviderResult<SpeechClip> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(text) {
            return Err(ProviderError::Rejected {
                status: 422,
                body: "voice unavailable".into(),
            });
        }
        Ok(SpeechClip {
            bytes: text.as_bytes().to_vec(),
            content_type: "audio/wav".into(),
            duration_ms: CLIP_MS,
        })
    }
}

pub struct CountingImages {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ImageProvider for CountingImages {
    async fn generate_image(&self, description: &str) -> ProviderResult<GeneratedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(GeneratedImage {
            bytes: description.as_bytes().to_vec(),
            content_type: "image/png".into(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoMode {
    /// Jobs complete on the first poll.
    Complete,
    /// Jobs stay `processing` forever.
    Never,
    /// Jobs fail on the first poll.
    Fail,
}

pub struct ScriptedVideo {
    pub mode: Mutex<VideoMode>,
    pub submitted: Mutex<Vec<VideoJobRequest>>,
}

impl ScriptedVideo {
    pub fn set_mode(&self, mode: VideoMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

#[async_trait]
impl VideoProvider for ScriptedVideo {
    async fn submit_job(&self, request: &VideoJobRequest) -> ProviderResult<String> {
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(request.clone());
        Ok(format!("job-{}", submitted.len()))
    }

    async fn poll_status(&self, job_id: &str) -> ProviderResult<RemoteJobStatus> {
        let mode = *self.mode.lock().unwrap();
        Ok(match mode {
            VideoMode::Complete => RemoteJobStatus::Completed {
                output_locator: format!("renders/{job_id}.mp4"),
            },
            VideoMode::Never => RemoteJobStatus::Processing,
            VideoMode::Fail => RemoteJobStatus::Failed {
                message: "encoder crashed".into(),
            },
        })
    }

    async fn fetch_output(&self, output_locator: &str) -> ProviderResult<Vec<u8>> {
        Ok(output_locator.as_bytes().to_vec())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub pipeline: Pipeline,
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub events: Arc<EventBus>,
    pub structuring: Arc<ScriptedStructuring>,
    pub speech: Arc<ScriptedSpeech>,
    pub images: Arc<CountingImages>,
    pub video: Arc<ScriptedVideo>,
}

/// Tuning that keeps video polling in the tens of milliseconds.
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        max_concurrent_provider_calls: 3,
        video_poll: PollPolicy {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
            timeout: Duration::from_millis(150),
        },
        presign_ttl: Duration::from_secs(600),
        outro_storage_key: Some(OUTRO_KEY.to_string()),
        min_narration_images: 2,
    }
}

impl Harness {
    pub fn new(scenes: i32, shots: i32, mode: VideoMode) -> Self {
        Self::with_config(scenes, shots, mode, test_config())
    }

    pub fn with_config(scenes: i32, shots: i32, mode: VideoMode, config: PipelineConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let events = Arc::new(EventBus::new(256));
        let structuring = Arc::new(ScriptedStructuring {
            output: Mutex::new(narration_document(scenes, shots)),
            calls: AtomicUsize::new(0),
        });
        let speech = Arc::new(ScriptedSpeech {
            failing: Mutex::new(HashSet::new()),
            calls: AtomicUsize::new(0),
        });
        let images = Arc::new(CountingImages {
            calls: AtomicUsize::new(0),
        });
        let video = Arc::new(ScriptedVideo {
            mode: Mutex::new(mode),
            submitted: Mutex::new(Vec::new()),
        });

        let providers = ProviderSet {
            structuring: structuring.clone(),
            speech: speech.clone(),
            image: images.clone(),
            video: video.clone(),
        };
        let pipeline = Pipeline::new(
            store.clone(),
            blobs.clone(),
            providers,
            events.clone(),
            config,
        );

        Self {
            pipeline,
            store,
            blobs,
            events,
            structuring,
            speech,
            images,
            video,
        }
    }

    /// Upload a short novel, chapter it into one chapter and return the
    /// chapter id.
    pub async fn chapter(&self) -> DbId {
        let resource = self
            .pipeline
            .resources()
            .register_upload(
                7,
                "novel.txt",
                "text/plain",
                b"It was raining. She waited for the bus.\n".to_vec(),
            )
            .await
            .unwrap();
        let chapters = self.pipeline.chapters();
        let novel = chapters
            .create_novel(resource.id, 7, Some("noir"), None)
            .await
            .unwrap();
        chapters.chapter_novel(novel.id, 1).await.unwrap()[0].id
    }

    /// Store the closing clip final videos append.
    pub async fn seed_outro(&self) {
        self.blobs
            .upload(OUTRO_KEY, b"outro".to_vec(), "video/mp4")
            .await
            .unwrap();
    }
}
