//! Subtitle generation: one SubRip caption track per narration, timed
//! by the measured duration of each shot's audio.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use storyreel_core::dependencies::Stage;
use storyreel_core::lifecycle::UnitState;
use storyreel_core::naming::subtitle_key;
use storyreel_core::narration::{NarrationContent, ShotKey};
use storyreel_core::subtitle::{layout_cues, render_srt, CaptionCue, TimedText, SRT_CONTENT_TYPE};
use storyreel_core::types::DbId;
use storyreel_db::models::audio::Audio;
use storyreel_db::models::subtitle::Subtitle;
use storyreel_events::{names, PipelineEvent};

use crate::context::PipelineContext;
use crate::dependencies::DependencyChecker;
use crate::error::{PipelineError, PipelineResult};
use crate::narration::NarrationGenerator;

#[derive(Clone)]
pub struct SubtitleGenerator {
    ctx: Arc<PipelineContext>,
}

impl SubtitleGenerator {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Build and store the caption track, superseding any previous one.
    ///
    /// Fails with a precondition error, without creating a record, unless
    /// the narration and all of its audio have completed.
    pub async fn generate(&self, narration_id: DbId) -> PipelineResult<Subtitle> {
        let narration = self
            .ctx
            .store
            .find_narration(narration_id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "narration",
                id: narration_id,
            })?;
        DependencyChecker::new(self.ctx.clone())
            .can_run(Stage::Subtitle, narration.chapter_id)
            .await?;
        let (narration, content) = NarrationGenerator::new(self.ctx.clone())
            .completed(narration.id)
            .await?;

        let subtitle = self.ctx.store.supersede_subtitle(narration.id).await?;
        tracing::info!(narration_id, subtitle_id = subtitle.id, "Subtitle started");

        match self.render(narration.id, subtitle.id, &content).await {
            Ok((storage_key, cue_count)) => {
                let subtitle = self
                    .ctx
                    .store
                    .complete_subtitle(subtitle.id, &storage_key, cue_count)
                    .await?;
                tracing::info!(narration_id, subtitle_id = subtitle.id, cue_count, "Subtitle completed");
                self.ctx.publish(
                    PipelineEvent::new(names::SUBTITLE_COMPLETED)
                        .with_source("subtitle", subtitle.id)
                        .with_chapter(narration.chapter_id)
                        .with_payload(json!({ "cues": cue_count })),
                );
                Ok(subtitle)
            }
            Err(err) => {
                let message = err.to_string();
                self.ctx
                    .store
                    .fail_subtitle(subtitle.id, &message)
                    .await?;
                tracing::warn!(narration_id, subtitle_id = subtitle.id, error = %message, "Subtitle failed");
                self.ctx.publish(
                    PipelineEvent::new(names::SUBTITLE_FAILED)
                        .with_source("subtitle", subtitle.id)
                        .with_chapter(narration.chapter_id)
                        .with_payload(json!({ "error": message })),
                );
                Err(err)
            }
        }
    }

    async fn render(
        &self,
        narration_id: DbId,
        subtitle_id: DbId,
        content: &NarrationContent,
    ) -> PipelineResult<(String, i32)> {
        let audio = self.ctx.store.list_audio(narration_id).await?;
        let cues = caption_cues(content, &audio)?;
        let storage_key = subtitle_key(narration_id, subtitle_id);
        self.ctx
            .blobs
            .upload(&storage_key, render_srt(&cues).into_bytes(), SRT_CONTENT_TYPE)
            .await?;
        Ok((storage_key, cues.len() as i32))
    }
}

/// Lay out the narration's caption cues on the timeline formed by its
/// completed audio clips, in shot order.
pub fn caption_cues(content: &NarrationContent, audio: &[Audio]) -> PipelineResult<Vec<CaptionCue>> {
    let durations: HashMap<ShotKey, i64> = audio
        .iter()
        .filter(|a| a.state() == UnitState::Completed)
        .filter_map(|a| a.duration_ms.map(|ms| (a.key(), ms)))
        .collect();

    let units = content
        .shots()
        .map(|shot| {
            durations
                .get(&shot.key)
                .map(|&duration_ms| TimedText {
                    key: shot.key,
                    text: &shot.shot.text,
                    duration_ms,
                })
                .ok_or_else(|| {
                    PipelineError::Validation(format!("No completed audio for {}", shot.key))
                })
        })
        .collect::<PipelineResult<Vec<_>>>()?;

    Ok(layout_cues(&units)?)
}
