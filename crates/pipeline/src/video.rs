//! Narration and final video assembly through the asynchronous video
//! provider.
//!
//! Every video goes `pending -> processing -> completed | failed`. A
//! video is `processing` only while a provider job is being polled; when
//! polling ends without success (failure, deadline, cancellation) the
//! video is marked `failed` before the call returns, so nothing is left
//! in flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use storyreel_core::assembly::{plan_final_cut, plan_narration_clips, ClipPlan, ShotAudio};
use storyreel_core::dependencies::Stage;
use storyreel_core::lifecycle::UnitState;
use storyreel_core::naming::{final_video_key, narration_video_key};
use storyreel_core::narration::ShotKey;
use storyreel_core::polling::JobOutcome;
use storyreel_core::subtitle::render_srt;
use storyreel_core::types::DbId;
use storyreel_db::models::status::VideoType;
use storyreel_db::models::video::Video;
use storyreel_events::{names, PipelineEvent};
use storyreel_providers::{ClipSegment, VideoJobRequest};
use tokio_util::sync::CancellationToken;

use crate::chapters::ChapterService;
use crate::context::PipelineContext;
use crate::dependencies::DependencyChecker;
use crate::error::{PipelineError, PipelineResult};
use crate::fanout::run_bounded;
use crate::image::ImageGenerator;
use crate::narration::NarrationGenerator;
use crate::poller::poll_until_terminal;
use crate::report::{BatchReport, UnitFailure};
use crate::subtitle::caption_cues;

const VIDEO_CONTENT_TYPE: &str = "video/mp4";

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

fn stage_for(video: &Video) -> Stage {
    match video.video_type() {
        Some(VideoType::FinalVideo) => Stage::FinalVideo,
        _ => Stage::NarrationVideo,
    }
}

#[derive(Clone)]
pub struct VideoGenerator {
    ctx: Arc<PipelineContext>,
}

impl VideoGenerator {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Render one narration video per scene, replacing any previous set.
    ///
    /// Clips render concurrently under the shared provider budget. A clip
    /// that fails does not stop its siblings; it is reported in the batch
    /// and stays `failed`.
    pub async fn generate_narration_videos(
        &self,
        chapter_id: DbId,
        cancel: &CancellationToken,
    ) -> PipelineResult<BatchReport<Video>> {
        DependencyChecker::new(self.ctx.clone())
            .can_run(Stage::NarrationVideo, chapter_id)
            .await?;
        let chapter = ChapterService::new(self.ctx.clone()).find(chapter_id).await?;
        let plans = self.plan_clips(chapter_id).await?;

        let sequences: Vec<i32> = plans.iter().map(|p| p.sequence).collect();
        let videos = self
            .ctx
            .store
            .replace_videos(chapter_id, chapter.user_id, VideoType::NarrationVideo, &sequences)
            .await?;
        tracing::info!(chapter_id, clips = videos.len(), "Narration videos started");

        let results = run_bounded(
            &self.ctx.limiter,
            cancel,
            Stage::NarrationVideo,
            plans.iter().zip(videos.iter()).collect(),
            |(plan, video)| self.render_clip(plan, video, cancel),
        )
        .await;

        let mut report = BatchReport::default();
        let mut cancelled = false;
        for (video, result) in videos.iter().zip(results) {
            match result {
                Ok(done) => report.completed.push(done),
                Err(err) => {
                    cancelled |= matches!(err, PipelineError::Cancelled { .. });
                    self.settle_failed(video.id, chapter_id, &err).await;
                    report.failed.push(UnitFailure::for_sequence(video.sequence, &err));
                }
            }
        }

        tracing::info!(
            chapter_id,
            completed = report.completed.len(),
            failed = report.failed.len(),
            "Narration videos finished"
        );
        if cancelled {
            return Err(PipelineError::Cancelled {
                stage: Stage::NarrationVideo,
            });
        }
        Ok(report)
    }

    /// Concatenate the chapter's narration videos and the closing clip
    /// into the final video, replacing any previous one.
    pub async fn generate_final_video(
        &self,
        chapter_id: DbId,
        cancel: &CancellationToken,
    ) -> PipelineResult<Video> {
        DependencyChecker::new(self.ctx.clone())
            .can_run(Stage::FinalVideo, chapter_id)
            .await?;
        let chapter = ChapterService::new(self.ctx.clone()).find(chapter_id).await?;
        let outro_key = self.ctx.config.outro_storage_key.clone().ok_or_else(|| {
            PipelineError::Validation("No closing clip is configured".into())
        })?;

        let mut parts = Vec::new();
        for video in self
            .ctx
            .store
            .list_active_videos(chapter_id, VideoType::NarrationVideo)
            .await?
        {
            let key = video.storage_key.clone().ok_or_else(|| {
                PipelineError::Internal(format!("Completed video {} has no storage key", video.id))
            })?;
            parts.push((video.sequence, key));
        }
        let ordered = plan_final_cut(&parts, &outro_key)?;

        let mut inputs = Vec::with_capacity(ordered.len());
        for key in &ordered {
            inputs.push(self.ctx.blobs.presign_download(key, self.ctx.config.presign_ttl).await?);
        }

        let video = self
            .ctx
            .store
            .replace_videos(chapter_id, chapter.user_id, VideoType::FinalVideo, &[1])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Internal("No final video row was created".into()))?;
        tracing::info!(chapter_id, video_id = video.id, inputs = inputs.len(), "Final video started");

        let request = VideoJobRequest::Concatenate { inputs };
        let result = self
            .single_job(Stage::FinalVideo, cancel, |_| self.submit_and_await(&video, &request, cancel))
            .await;
        if let Err(err) = &result {
            self.settle_failed(video.id, chapter_id, err).await;
        }
        result
    }

    /// Resume polling a video whose process stopped while its job was in
    /// flight. The original deadline still applies.
    pub async fn resume(&self, video_id: DbId, cancel: &CancellationToken) -> PipelineResult<Video> {
        let video = self
            .ctx
            .store
            .find_video(video_id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "video",
                id: video_id,
            })?;
        if video.state() != UnitState::Processing {
            return Err(PipelineError::Conflict(format!(
                "Video {video_id} is {} and has no job to resume",
                video.state().as_str()
            )));
        }
        let job_id = video.provider_job_id.clone().ok_or_else(|| {
            PipelineError::Internal(format!("Processing video {video_id} has no provider job id"))
        })?;

        let elapsed = (chrono::Utc::now() - video.updated_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let submitted_at = now().checked_sub(elapsed).unwrap_or_else(now);
        tracing::info!(video_id, job_id = %job_id, elapsed_secs = elapsed.as_secs(), "Resuming video job");

        let stage = stage_for(&video);
        let result = self
            .single_job(stage, cancel, |_| self.await_job(&video, &job_id, submitted_at, cancel))
            .await;
        if let Err(err) = &result {
            self.settle_failed(video.id, video.chapter_id, err).await;
        }
        result
    }

    // ---- private helpers ----

    /// Gather completed audio, latest images and captions, and cut them
    /// into per-scene clips.
    async fn plan_clips(&self, chapter_id: DbId) -> PipelineResult<Vec<ClipPlan>> {
        let (narration, content) = NarrationGenerator::new(self.ctx.clone())
            .completed_for_chapter(chapter_id)
            .await?;

        let audio_rows = self.ctx.store.list_audio(narration.id).await?;
        let audio: HashMap<ShotKey, ShotAudio> = audio_rows
            .iter()
            .filter(|a| a.state() == UnitState::Completed)
            .filter_map(|a| {
                Some((
                    a.key(),
                    ShotAudio {
                        storage_key: a.storage_key.clone()?,
                        duration_ms: a.duration_ms?,
                    },
                ))
            })
            .collect();

        let images: HashMap<ShotKey, String> = ImageGenerator::new(self.ctx.clone())
            .latest_completed(chapter_id, narration.id)
            .await?
            .into_iter()
            .filter_map(|(key, image)| image.storage_key.map(|k| (key, k)))
            .collect();

        let cues = caption_cues(&content, &audio_rows)?;
        Ok(plan_narration_clips(&content, &audio, &images, &cues)?)
    }

    async fn render_clip(
        &self,
        plan: &ClipPlan,
        video: &Video,
        cancel: &CancellationToken,
    ) -> PipelineResult<Video> {
        let ttl = self.ctx.config.presign_ttl;
        let mut segments = Vec::with_capacity(plan.shots.len());
        for shot in &plan.shots {
            segments.push(ClipSegment {
                image_url: self.ctx.blobs.presign_download(&shot.image_key, ttl).await?,
                audio_url: self.ctx.blobs.presign_download(&shot.audio_key, ttl).await?,
                start_ms: shot.start_ms,
                duration_ms: shot.duration_ms,
            });
        }
        let request = VideoJobRequest::NarrationClip {
            sequence: plan.sequence,
            segments,
            captions_srt: render_srt(&plan.captions),
        };
        self.submit_and_await(video, &request, cancel).await
    }

    async fn submit_and_await(
        &self,
        video: &Video,
        request: &VideoJobRequest,
        cancel: &CancellationToken,
    ) -> PipelineResult<Video> {
        let stage = stage_for(video);
        let job_id = self
            .ctx
            .providers
            .video
            .submit_job(request)
            .await
            .map_err(|e| PipelineError::provider(stage, format!("video {}", video.id), e))?;
        let submitted_at = now();

        let video = self.ctx.store.start_video(video.id, &job_id).await?;
        tracing::info!(video_id = video.id, sequence = video.sequence, job_id = %job_id, "Video job submitted");
        self.ctx.publish(
            PipelineEvent::new(names::VIDEO_PROCESSING)
                .with_source("video", video.id)
                .with_chapter(video.chapter_id)
                .with_payload(json!({ "job_id": job_id, "sequence": video.sequence })),
        );

        self.await_job(&video, &job_id, submitted_at, cancel).await
    }

    /// Poll the job to a terminal outcome and store the rendered output.
    async fn await_job(
        &self,
        video: &Video,
        job_id: &str,
        submitted_at: Instant,
        cancel: &CancellationToken,
    ) -> PipelineResult<Video> {
        let stage = stage_for(video);
        let outcome = poll_until_terminal(
            self.ctx.providers.video.as_ref(),
            job_id,
            self.ctx.config.video_poll,
            submitted_at,
            cancel,
        )
        .await;

        let output_locator = match outcome {
            JobOutcome::Completed { output_locator } => output_locator,
            JobOutcome::Failed { .. } => {
                return Err(PipelineError::VideoFailed {
                    video_id: video.id,
                    message: outcome.error_message().unwrap_or_default(),
                })
            }
            JobOutcome::TimedOut { .. } => {
                return Err(PipelineError::Timeout {
                    video_id: video.id,
                    message: outcome.error_message().unwrap_or_default(),
                })
            }
            JobOutcome::Cancelled => return Err(PipelineError::Cancelled { stage }),
        };

        let bytes = self
            .ctx
            .providers
            .video
            .fetch_output(&output_locator)
            .await
            .map_err(|e| PipelineError::provider(stage, format!("video {}", video.id), e))?;
        let storage_key = match video.video_type() {
            Some(VideoType::FinalVideo) => final_video_key(video.chapter_id, video.id),
            _ => narration_video_key(video.chapter_id, video.id, video.sequence),
        };
        self.ctx
            .blobs
            .upload(&storage_key, bytes, VIDEO_CONTENT_TYPE)
            .await?;

        let video = self.ctx.store.complete_video(video.id, &storage_key).await?;
        tracing::info!(video_id = video.id, sequence = video.sequence, "Video completed");
        self.ctx.publish(
            PipelineEvent::new(names::VIDEO_COMPLETED)
                .with_source("video", video.id)
                .with_chapter(video.chapter_id)
                .with_payload(json!({
                    "video_type": stage.as_str(),
                    "sequence": video.sequence,
                })),
        );
        Ok(video)
    }

    /// Run one job under the shared provider budget.
    async fn single_job<F, Fut>(
        &self,
        stage: Stage,
        cancel: &CancellationToken,
        job: F,
    ) -> PipelineResult<Video>
    where
        F: Fn(()) -> Fut,
        Fut: std::future::Future<Output = PipelineResult<Video>>,
    {
        run_bounded(&self.ctx.limiter, cancel, stage, vec![()], job)
            .await
            .into_iter()
            .next()
            .unwrap_or_else(|| Err(PipelineError::Internal("Video job produced no result".into())))
    }

    /// Mark a video `failed` unless it already reached a terminal state.
    async fn settle_failed(&self, video_id: DbId, chapter_id: DbId, err: &PipelineError) {
        let current = match self.ctx.store.find_video(video_id).await {
            Ok(Some(video)) => video,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(video_id, error = %e, "Could not load video to mark it failed");
                return;
            }
        };
        if current.state().is_terminal() {
            return;
        }

        let message = err.to_string();
        if let Err(e) = self.ctx.store.fail_video(video_id, &message).await {
            tracing::warn!(video_id, error = %e, "Could not mark video failed");
            return;
        }
        tracing::warn!(video_id, sequence = current.sequence, error = %message, "Video failed");
        self.ctx.publish(
            PipelineEvent::new(names::VIDEO_FAILED)
                .with_source("video", video_id)
                .with_chapter(chapter_id)
                .with_payload(json!({ "sequence": current.sequence, "error": message })),
        );
    }
}
