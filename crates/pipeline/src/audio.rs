//! Audio generation: one synthesized clip per narration shot.
//!
//! Shots are synthesized in a bounded fan-out. Each clip is persisted as
//! soon as it completes, so a partial failure keeps every finished clip
//! and a later [`AudioGenerator::retry`] re-runs only the named shots.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;
use storyreel_core::dependencies::Stage;
use storyreel_core::lifecycle::UnitState;
use storyreel_core::naming::{audio_key, extension_for_content_type};
use storyreel_core::narration::{NarrationContent, ShotKey};
use storyreel_core::types::DbId;
use storyreel_db::models::audio::Audio;
use storyreel_db::models::narration::Narration;
use storyreel_events::{names, PipelineEvent};
use tokio_util::sync::CancellationToken;

use crate::context::PipelineContext;
use crate::dependencies::DependencyChecker;
use crate::error::{PipelineError, PipelineResult};
use crate::fanout::run_bounded;
use crate::narration::NarrationGenerator;
use crate::report::{BatchReport, UnitFailure};

#[derive(Clone)]
pub struct AudioGenerator {
    ctx: Arc<PipelineContext>,
}

impl AudioGenerator {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Make sure every shot of the narration has completed audio.
    ///
    /// Shots without a record get a `pending` one; pending and failed
    /// shots are synthesized; completed shots are left untouched.
    pub async fn generate_all(
        &self,
        narration_id: DbId,
        cancel: &CancellationToken,
    ) -> PipelineResult<BatchReport<Audio>> {
        let (narration, content) = self.prepare(narration_id).await?;
        let keys = content.shot_keys();
        self.ensure_rows(narration.id, &keys).await?;
        let rows = self.ctx.store.list_audio(narration.id).await?;
        self.synthesize(&narration, &content, rows, cancel).await
    }

    /// Re-run only the given shots. Completed shots are reported as
    /// completed without a new provider call.
    pub async fn retry(
        &self,
        narration_id: DbId,
        keys: &[ShotKey],
        cancel: &CancellationToken,
    ) -> PipelineResult<BatchReport<Audio>> {
        let (narration, content) = self.prepare(narration_id).await?;
        if let Some(unknown) = keys.iter().find(|k| content.find_shot(**k).is_none()) {
            return Err(PipelineError::Validation(format!(
                "Narration {narration_id} has no {unknown}"
            )));
        }
        self.ensure_rows(narration.id, keys).await?;

        let wanted: HashSet<ShotKey> = keys.iter().copied().collect();
        let rows = self
            .ctx
            .store
            .list_audio(narration.id)
            .await?
            .into_iter()
            .filter(|a| wanted.contains(&a.key()))
            .collect();
        self.synthesize(&narration, &content, rows, cancel).await
    }

    // ---- private helpers ----

    async fn prepare(&self, narration_id: DbId) -> PipelineResult<(Narration, NarrationContent)> {
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
            .can_run(Stage::Audio, narration.chapter_id)
            .await?;
        NarrationGenerator::new(self.ctx.clone())
            .completed(narration_id)
            .await
    }

    /// Insert `pending` rows for keys that have none yet.
    async fn ensure_rows(&self, narration_id: DbId, keys: &[ShotKey]) -> PipelineResult<()> {
        let existing: HashSet<ShotKey> = self
            .ctx
            .store
            .list_audio(narration_id)
            .await?
            .iter()
            .map(Audio::key)
            .collect();
        let missing: Vec<ShotKey> = keys
            .iter()
            .copied()
            .filter(|k| !existing.contains(k))
            .collect();
        if !missing.is_empty() {
            self.ctx
                .store
                .create_pending_audio(narration_id, &missing)
                .await?;
        }
        Ok(())
    }

    async fn synthesize(
        &self,
        narration: &Narration,
        content: &NarrationContent,
        rows: Vec<Audio>,
        cancel: &CancellationToken,
    ) -> PipelineResult<BatchReport<Audio>> {
        let mut report = BatchReport::default();
        let mut work = Vec::new();
        for row in rows {
            match row.state() {
                UnitState::Completed => report.completed.push(row),
                UnitState::Failed => work.push(self.ctx.store.reset_audio(row.id).await?),
                UnitState::Pending | UnitState::Processing => work.push(row),
            }
        }

        tracing::info!(
            narration_id = narration.id,
            shots = work.len(),
            already_completed = report.completed.len(),
            "Audio synthesis started"
        );

        let results = run_bounded(
            &self.ctx.limiter,
            cancel,
            Stage::Audio,
            work.iter().collect(),
            |row| self.synthesize_one(narration.id, content, row),
        )
        .await;

        let mut cancelled = false;
        for (row, result) in work.iter().zip(results) {
            match result {
                Ok(audio) => report.completed.push(audio),
                Err(err) => {
                    cancelled |= matches!(err, PipelineError::Cancelled { .. });
                    let key = row.key();
                    tracing::warn!(
                        narration_id = narration.id,
                        scene_number = key.scene_number,
                        shot_number = key.shot_number,
                        error = %err,
                        "Audio synthesis failed"
                    );
                    if let Err(e) = self.ctx.store.fail_audio(row.id, &err.to_string()).await {
                        tracing::warn!(audio_id = row.id, error = %e, "Could not mark audio failed");
                    }
                    report.failed.push(UnitFailure::for_shot(key, &err));
                }
            }
        }
        report.completed.sort_by_key(Audio::key);

        tracing::info!(
            narration_id = narration.id,
            completed = report.completed.len(),
            failed = report.failed.len(),
            "Audio synthesis finished"
        );
        self.ctx.publish(
            PipelineEvent::new(names::AUDIO_BATCH_FINISHED)
                .with_source("narration", narration.id)
                .with_chapter(narration.chapter_id)
                .with_payload(json!({
                    "completed": report.completed.len(),
                    "failed": report.failed_shots(),
                })),
        );

        if cancelled {
            return Err(PipelineError::Cancelled { stage: Stage::Audio });
        }
        Ok(report)
    }

    async fn synthesize_one(
        &self,
        narration_id: DbId,
        content: &NarrationContent,
        row: &Audio,
    ) -> PipelineResult<Audio> {
        let key = row.key();
        let shot = content.find_shot(key).ok_or_else(|| {
            PipelineError::Validation(format!("Narration {narration_id} has no {key}"))
        })?;

        let clip = self
            .ctx
            .providers
            .speech
            .synthesize(&shot.text)
            .await
            .map_err(|e| PipelineError::provider(Stage::Audio, key.to_string(), e))?;

        let storage_key = audio_key(
            narration_id,
            key,
            extension_for_content_type(&clip.content_type),
        );
        self.ctx
            .blobs
            .upload(&storage_key, clip.bytes, &clip.content_type)
            .await?;
        let audio = self
            .ctx
            .store
            .complete_audio(row.id, &storage_key, clip.duration_ms)
            .await?;

        tracing::debug!(
            narration_id,
            scene_number = key.scene_number,
            shot_number = key.shot_number,
            duration_ms = clip.duration_ms,
            "Audio clip stored"
        );
        Ok(audio)
    }
}
