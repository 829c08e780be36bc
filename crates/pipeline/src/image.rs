//! Image generation: one versioned still per narration shot.
//!
//! Every [`ImageGenerator::generate_all`] call allocates the next version
//! for each shot key in one atomic step, so earlier versions stay
//! retrievable and concurrent calls never share a version number.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use storyreel_core::dependencies::Stage;
use storyreel_core::lifecycle::UnitState;
use storyreel_core::naming::{extension_for_content_type, image_key};
use storyreel_core::narration::{NarrationContent, ShotKey};
use storyreel_core::types::DbId;
use storyreel_db::models::image::Image;
use storyreel_events::{names, PipelineEvent};
use tokio_util::sync::CancellationToken;

use crate::context::PipelineContext;
use crate::dependencies::DependencyChecker;
use crate::error::{PipelineError, PipelineResult};
use crate::fanout::run_bounded;
use crate::narration::NarrationGenerator;
use crate::report::{BatchReport, UnitFailure};

#[derive(Clone)]
pub struct ImageGenerator {
    ctx: Arc<PipelineContext>,
}

impl ImageGenerator {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Generate a new version of every shot image of the chapter's
    /// active narration.
    pub async fn generate_all(
        &self,
        chapter_id: DbId,
        cancel: &CancellationToken,
    ) -> PipelineResult<BatchReport<Image>> {
        let (narration_id, content) = self.prepare(chapter_id).await?;
        let rows = self
            .ctx
            .store
            .allocate_image_versions(chapter_id, narration_id, &content.shot_keys())
            .await?;
        tracing::info!(chapter_id, narration_id, shots = rows.len(), "Image generation started");
        self.render(chapter_id, &content, rows, cancel).await
    }

    /// Re-run the failed (or stranded `pending`) images of one version.
    /// The retried images keep their version number.
    pub async fn retry_failed(
        &self,
        chapter_id: DbId,
        version: i32,
        cancel: &CancellationToken,
    ) -> PipelineResult<BatchReport<Image>> {
        let (narration_id, content) = self.prepare(chapter_id).await?;
        let mut rows = Vec::new();
        for image in self.ctx.store.list_images(chapter_id).await? {
            if image.narration_id != narration_id || image.version != version {
                continue;
            }
            match image.state() {
                UnitState::Completed => {}
                UnitState::Failed => rows.push(self.ctx.store.reset_image(image.id).await?),
                UnitState::Pending | UnitState::Processing => rows.push(image),
            }
        }
        tracing::info!(chapter_id, version, shots = rows.len(), "Image retry started");
        self.render(chapter_id, &content, rows, cancel).await
    }

    /// Latest completed image per shot of a narration.
    pub async fn latest_completed(
        &self,
        chapter_id: DbId,
        narration_id: DbId,
    ) -> PipelineResult<HashMap<ShotKey, Image>> {
        let mut latest: HashMap<ShotKey, Image> = HashMap::new();
        for image in self.ctx.store.list_images(chapter_id).await? {
            if image.narration_id != narration_id
                || image.state() != UnitState::Completed
                || image.storage_key.is_none()
            {
                continue;
            }
            match latest.get(&image.key()) {
                Some(current) if current.version >= image.version => {}
                _ => {
                    latest.insert(image.key(), image);
                }
            }
        }
        Ok(latest)
    }

    // ---- private helpers ----

    async fn prepare(&self, chapter_id: DbId) -> PipelineResult<(DbId, NarrationContent)> {
        DependencyChecker::new(self.ctx.clone())
            .can_run(Stage::Image, chapter_id)
            .await?;
        let (narration, content) = NarrationGenerator::new(self.ctx.clone())
            .completed_for_chapter(chapter_id)
            .await?;
        Ok((narration.id, content))
    }

    async fn render(
        &self,
        chapter_id: DbId,
        content: &NarrationContent,
        rows: Vec<Image>,
        cancel: &CancellationToken,
    ) -> PipelineResult<BatchReport<Image>> {
        let results = run_bounded(
            &self.ctx.limiter,
            cancel,
            Stage::Image,
            rows.iter().collect(),
            |row| self.render_one(chapter_id, content, row),
        )
        .await;

        let mut report = BatchReport::default();
        let mut cancelled = false;
        for (row, result) in rows.iter().zip(results) {
            match result {
                Ok(image) => report.completed.push(image),
                Err(err) => {
                    cancelled |= matches!(err, PipelineError::Cancelled { .. });
                    let key = row.key();
                    tracing::warn!(
                        chapter_id,
                        scene_number = key.scene_number,
                        shot_number = key.shot_number,
                        version = row.version,
                        error = %err,
                        "Image generation failed"
                    );
                    if let Err(e) = self.ctx.store.fail_image(row.id, &err.to_string()).await {
                        tracing::warn!(image_id = row.id, error = %e, "Could not mark image failed");
                    }
                    report.failed.push(UnitFailure::for_shot(key, &err));
                }
            }
        }

        tracing::info!(
            chapter_id,
            completed = report.completed.len(),
            failed = report.failed.len(),
            "Image generation finished"
        );
        self.ctx.publish(
            PipelineEvent::new(names::IMAGE_BATCH_FINISHED)
                .with_source("chapter", chapter_id)
                .with_chapter(chapter_id)
                .with_payload(json!({
                    "completed": report.completed.len(),
                    "failed": report.failed_shots(),
                })),
        );

        if cancelled {
            return Err(PipelineError::Cancelled { stage: Stage::Image });
        }
        Ok(report)
    }

    async fn render_one(
        &self,
        chapter_id: DbId,
        content: &NarrationContent,
        row: &Image,
    ) -> PipelineResult<Image> {
        let key = row.key();
        let shot = content.find_shot(key).ok_or_else(|| {
            PipelineError::Validation(format!("Narration {} has no {key}", row.narration_id))
        })?;

        let image = self
            .ctx
            .providers
            .image
            .generate_image(&shot.visual_description)
            .await
            .map_err(|e| PipelineError::provider(Stage::Image, format!("{key} v{}", row.version), e))?;

        let storage_key = image_key(
            chapter_id,
            key,
            row.version,
            extension_for_content_type(&image.content_type),
        );
        self.ctx
            .blobs
            .upload(&storage_key, image.bytes, &image.content_type)
            .await?;
        Ok(self.ctx.store.complete_image(row.id, &storage_key).await?)
    }
}
