//! Narration generation: chapter text to a validated scene/shot document.
//!
//! Regeneration supersedes: a new `pending` narration replaces the
//! active one atomically before the provider is called, so a chapter
//! never has two active narrations.

use std::sync::Arc;

use serde_json::json;
use storyreel_core::dependencies::Stage;
use storyreel_core::narration::NarrationContent;
use storyreel_core::types::DbId;
use storyreel_db::models::narration::Narration;
use storyreel_events::{names, PipelineEvent};
use storyreel_providers::StructureRequest;
use tokio_util::sync::CancellationToken;

use crate::chapters::ChapterService;
use crate::context::PipelineContext;
use crate::dependencies::DependencyChecker;
use crate::error::{PipelineError, PipelineResult};
use crate::fanout::run_bounded;

#[derive(Clone)]
pub struct NarrationGenerator {
    ctx: Arc<PipelineContext>,
}

impl NarrationGenerator {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Generate (or regenerate) the chapter's narration.
    ///
    /// Provider failures and malformed output leave the new narration
    /// `failed` with the error stored on it.
    pub async fn generate(
        &self,
        chapter_id: DbId,
        cancel: &CancellationToken,
    ) -> PipelineResult<Narration> {
        DependencyChecker::new(self.ctx.clone())
            .can_run(Stage::Narration, chapter_id)
            .await?;

        let chapter = ChapterService::new(self.ctx.clone()).find(chapter_id).await?;
        let novel = self.ctx.store.find_novel(chapter.novel_id).await?;
        let narration = self
            .ctx
            .store
            .supersede_narration(chapter.id, chapter.user_id)
            .await?;
        tracing::info!(chapter_id, narration_id = narration.id, "Narration started");

        let request = StructureRequest {
            chapter_text: &chapter.chapter_text,
            style: novel.as_ref().and_then(|n| n.style.as_deref()),
            narration_type: novel.as_ref().and_then(|n| n.narration_type.as_deref()),
        };

        let outcome = run_bounded(
            &self.ctx.limiter,
            cancel,
            Stage::Narration,
            vec![request],
            |request| async move {
                let raw = self
                    .ctx
                    .providers
                    .structuring
                    .structure(request)
                    .await
                    .map_err(|e| {
                        PipelineError::provider(Stage::Narration, format!("chapter {chapter_id}"), e)
                    })?;
                Ok(NarrationContent::parse_provider_output(&raw)?)
            },
        )
        .await
        .into_iter()
        .next()
        .unwrap_or_else(|| Err(PipelineError::Internal("Structuring call produced no result".into())));

        match outcome {
            Ok(content) => {
                let narration = self
                    .ctx
                    .store
                    .complete_narration(narration.id, &content)
                    .await?;
                tracing::info!(
                    chapter_id,
                    narration_id = narration.id,
                    scenes = content.scenes.len(),
                    shots = content.shot_count(),
                    "Narration completed"
                );
                self.ctx.publish(
                    PipelineEvent::new(names::NARRATION_COMPLETED)
                        .with_source("narration", narration.id)
                        .with_chapter(chapter_id)
                        .with_payload(json!({
                            "scenes": content.scenes.len(),
                            "shots": content.shot_count(),
                        })),
                );
                Ok(narration)
            }
            Err(err) => {
                let message = err.to_string();
                self.ctx
                    .store
                    .fail_narration(narration.id, &message)
                    .await?;
                tracing::warn!(
                    chapter_id,
                    narration_id = narration.id,
                    error = %message,
                    "Narration failed"
                );
                self.ctx.publish(
                    PipelineEvent::new(names::NARRATION_FAILED)
                        .with_source("narration", narration.id)
                        .with_chapter(chapter_id)
                        .with_payload(json!({ "error": message })),
                );
                Err(err)
            }
        }
    }

    /// The chapter's active narration, which must have completed.
    pub async fn completed_for_chapter(
        &self,
        chapter_id: DbId,
    ) -> PipelineResult<(Narration, NarrationContent)> {
        let narration = self
            .ctx
            .store
            .find_active_narration(chapter_id)
            .await?
            .ok_or_else(|| PipelineError::Validation(format!(
                "Chapter {chapter_id} has no active narration"
            )))?;
        let content = narration.content().cloned().ok_or_else(|| {
            PipelineError::Validation(format!(
                "Narration {} has no completed content",
                narration.id
            ))
        })?;
        Ok((narration, content))
    }

    /// An active narration by id, which must have completed.
    pub async fn completed(&self, narration_id: DbId) -> PipelineResult<(Narration, NarrationContent)> {
        let narration = self
            .ctx
            .store
            .find_narration(narration_id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "narration",
                id: narration_id,
            })?;
        let content = narration.content().cloned().ok_or_else(|| {
            PipelineError::Validation(format!(
                "Narration {narration_id} has no completed content"
            ))
        })?;
        Ok((narration, content))
    }
}
