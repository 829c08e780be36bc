//! Novel-to-video content pipeline.
//!
//! A novel upload is split into chapters; each chapter is narrated into
//! scenes and shots, which fan out into audio clips, versioned images and
//! a caption track, and are finally assembled into narration videos and
//! one final video.
//!
//! - [`Pipeline`]: facade owning the shared [`PipelineContext`] and
//!   handing out the stage services.
//! - [`DependencyChecker`]: evaluates stage preconditions against live
//!   store state.
//! - Stage services: [`NarrationGenerator`], [`AudioGenerator`],
//!   [`SubtitleGenerator`], [`ImageGenerator`], [`VideoGenerator`].

pub mod audio;
pub mod chapters;
pub mod config;
pub mod context;
pub mod dependencies;
pub mod error;
pub mod fanout;
pub mod image;
pub mod ledger;
pub mod narration;
pub mod poller;
pub mod report;
pub mod subtitle;
pub mod video;

use std::sync::Arc;

use serde::Serialize;
use storyreel_core::dependencies::Stage;
use storyreel_core::types::DbId;
use storyreel_db::models::audio::Audio;
use storyreel_db::models::image::Image;
use storyreel_db::models::subtitle::Subtitle;
use storyreel_db::models::video::Video;
use storyreel_db::store::PipelineStore;
use storyreel_events::EventBus;
use storyreel_providers::ProviderSet;
use storyreel_storage::BlobStore;
use tokio_util::sync::CancellationToken;

pub use audio::AudioGenerator;
pub use chapters::ChapterService;
pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use dependencies::{DependencyChecker, StageReport};
pub use error::{ErrorKind, PipelineError, PipelineResult};
pub use image::ImageGenerator;
pub use ledger::ResourceLedger;
pub use narration::NarrationGenerator;
pub use report::{BatchReport, UnitFailure};
pub use subtitle::SubtitleGenerator;
pub use video::VideoGenerator;

/// What a full chapter run produced. Stages that did not run are `None`.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterRun {
    pub chapter_id: DbId,
    pub narration_id: DbId,
    pub audio: BatchReport<Audio>,
    pub images: BatchReport<Image>,
    pub subtitle: Option<Subtitle>,
    pub narration_videos: Option<BatchReport<Video>>,
    pub final_video: Option<Video>,
}

/// Entry point wiring the shared collaborators into stage services.
#[derive(Clone)]
pub struct Pipeline {
    ctx: Arc<PipelineContext>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        blobs: Arc<dyn BlobStore>,
        providers: ProviderSet,
        events: Arc<EventBus>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            ctx: PipelineContext::new(store, blobs, providers, events, config),
        }
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    pub fn resources(&self) -> ResourceLedger {
        ResourceLedger::new(self.ctx.clone())
    }

    pub fn chapters(&self) -> ChapterService {
        ChapterService::new(self.ctx.clone())
    }

    pub fn dependencies(&self) -> DependencyChecker {
        DependencyChecker::new(self.ctx.clone())
    }

    pub fn narration(&self) -> NarrationGenerator {
        NarrationGenerator::new(self.ctx.clone())
    }

    pub fn audio(&self) -> AudioGenerator {
        AudioGenerator::new(self.ctx.clone())
    }

    pub fn subtitles(&self) -> SubtitleGenerator {
        SubtitleGenerator::new(self.ctx.clone())
    }

    pub fn images(&self) -> ImageGenerator {
        ImageGenerator::new(self.ctx.clone())
    }

    pub fn videos(&self) -> VideoGenerator {
        VideoGenerator::new(self.ctx.clone())
    }

    /// Drive one chapter through every stage in dependency order.
    ///
    /// Audio and images run concurrently after narration. The run stops
    /// early, without error, when a later stage's preconditions are not
    /// met (failed audio, too few images, no closing clip); the returned
    /// [`ChapterRun`] shows how far it got.
    pub async fn run_chapter(
        &self,
        chapter_id: DbId,
        cancel: &CancellationToken,
    ) -> PipelineResult<ChapterRun> {
        let narration = self.narration().generate(chapter_id, cancel).await?;

        let audio = self.audio();
        let images = self.images();
        let (audio, images) = tokio::join!(
            audio.generate_all(narration.id, cancel),
            images.generate_all(chapter_id, cancel),
        );
        let mut run = ChapterRun {
            chapter_id,
            narration_id: narration.id,
            audio: audio?,
            images: images?,
            subtitle: None,
            narration_videos: None,
            final_video: None,
        };

        if !run.audio.is_complete() {
            tracing::warn!(
                chapter_id,
                failed = run.audio.failed.len(),
                "Audio incomplete, stopping chapter run"
            );
            return Ok(run);
        }
        run.subtitle = Some(self.subtitles().generate(narration.id).await?);

        if !self.ready(Stage::NarrationVideo, chapter_id).await? {
            return Ok(run);
        }
        let videos = self
            .videos()
            .generate_narration_videos(chapter_id, cancel)
            .await?;
        let all_rendered = videos.is_complete();
        run.narration_videos = Some(videos);

        if !all_rendered || !self.ready(Stage::FinalVideo, chapter_id).await? {
            return Ok(run);
        }
        run.final_video = Some(self.videos().generate_final_video(chapter_id, cancel).await?);

        tracing::info!(chapter_id, "Chapter run completed");
        Ok(run)
    }

    async fn ready(&self, stage: Stage, chapter_id: DbId) -> PipelineResult<bool> {
        match self.dependencies().can_run(stage, chapter_id).await {
            Ok(()) => Ok(true),
            Err(PipelineError::Precondition { missing, .. }) => {
                tracing::info!(
                    chapter_id,
                    stage = %stage,
                    missing = ?missing,
                    "Stopping chapter run before stage"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
