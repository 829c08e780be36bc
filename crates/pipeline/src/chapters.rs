//! Novel creation and chaptering.

use std::sync::Arc;

use serde_json::json;
use storyreel_core::chaptering::split_chapters;
use storyreel_core::types::DbId;
use storyreel_db::models::chapter::Chapter;
use storyreel_db::models::novel::{CreateNovel, Novel};
use storyreel_events::{names, PipelineEvent};

use crate::context::PipelineContext;
use crate::error::{PipelineError, PipelineResult};
use crate::ledger::ResourceLedger;

#[derive(Clone)]
pub struct ChapterService {
    ctx: Arc<PipelineContext>,
}

impl ChapterService {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Create a novel over a `ready` resource. Blank hints are dropped.
    pub async fn create_novel(
        &self,
        resource_id: DbId,
        user_id: DbId,
        style: Option<&str>,
        narration_type: Option<&str>,
    ) -> PipelineResult<Novel> {
        let resource = ResourceLedger::new(self.ctx.clone())
            .find_ready(resource_id)
            .await?;

        let hint = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let novel = self
            .ctx
            .store
            .create_novel(&CreateNovel {
                resource_id: resource.id,
                user_id,
                style: hint(style),
                narration_type: hint(narration_type),
            })
            .await?;

        tracing::info!(novel_id = novel.id, resource_id, "Novel created");
        Ok(novel)
    }

    /// Split a novel's text into about `target` chapters and store them.
    ///
    /// Chapter text is immutable, so a novel that already has chapters
    /// fails with [`PipelineError::Conflict`].
    pub async fn chapter_novel(&self, novel_id: DbId, target: usize) -> PipelineResult<Vec<Chapter>> {
        let novel = self.find_novel(novel_id).await?;
        let bytes = ResourceLedger::new(self.ctx.clone())
            .download(novel.resource_id)
            .await?;
        let text = String::from_utf8(bytes).map_err(|e| {
            PipelineError::Validation(format!(
                "Resource {} is not valid UTF-8 text: {e}",
                novel.resource_id
            ))
        })?;

        let drafts = split_chapters(&text, target)?;
        let chapters = self
            .ctx
            .store
            .create_chapters(novel.id, novel.user_id, &drafts)
            .await?;

        tracing::info!(
            novel_id,
            target,
            chapters = chapters.len(),
            "Novel split into chapters"
        );
        self.ctx.publish(
            PipelineEvent::new(names::NOVEL_CHAPTERED)
                .with_source("novel", novel_id)
                .with_payload(json!({ "target": target, "chapters": chapters.len() })),
        );
        Ok(chapters)
    }

    pub async fn list(&self, novel_id: DbId) -> PipelineResult<Vec<Chapter>> {
        self.find_novel(novel_id).await?;
        Ok(self.ctx.store.list_chapters(novel_id).await?)
    }

    pub async fn find(&self, chapter_id: DbId) -> PipelineResult<Chapter> {
        self.ctx
            .store
            .find_chapter(chapter_id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "chapter",
                id: chapter_id,
            })
    }

    async fn find_novel(&self, novel_id: DbId) -> PipelineResult<Novel> {
        self.ctx
            .store
            .find_novel(novel_id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "novel",
                id: novel_id,
            })
    }
}
