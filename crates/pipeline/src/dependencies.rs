//! Stage dependency checker.
//!
//! Loads a live [`StageSnapshot`] of a chapter through the store traits
//! and evaluates it. Nothing is cached: every check re-reads status, so
//! two stages racing on the same chapter always see committed state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use storyreel_core::dependencies::{evaluate, MissingDependency, Stage, StageSnapshot};
use storyreel_core::lifecycle::UnitState;
use storyreel_core::types::DbId;
use storyreel_db::models::status::VideoType;

use crate::context::PipelineContext;
use crate::error::{PipelineError, PipelineResult};

/// Whether one stage may run, and what is missing if not.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub ready: bool,
    pub missing: Vec<MissingDependency>,
}

#[derive(Clone)]
pub struct DependencyChecker {
    ctx: Arc<PipelineContext>,
}

impl DependencyChecker {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// `Ok(())` if `stage` may run for the chapter, otherwise a
    /// [`PipelineError::Precondition`] listing every unmet dependency.
    pub async fn can_run(&self, stage: Stage, chapter_id: DbId) -> PipelineResult<()> {
        let snapshot = self.snapshot(chapter_id).await?;
        evaluate(stage, &snapshot).map_err(|missing| {
            tracing::info!(
                chapter_id,
                stage = %stage,
                missing = missing.len(),
                "Stage preconditions not met"
            );
            PipelineError::Precondition { stage, missing }
        })
    }

    /// Readiness of every stage, in pipeline order.
    pub async fn report(&self, chapter_id: DbId) -> PipelineResult<Vec<StageReport>> {
        let snapshot = self.snapshot(chapter_id).await?;
        Ok(Stage::ALL
            .iter()
            .map(|&stage| match evaluate(stage, &snapshot) {
                Ok(()) => StageReport {
                    stage,
                    ready: true,
                    missing: Vec::new(),
                },
                Err(missing) => StageReport {
                    stage,
                    ready: false,
                    missing,
                },
            })
            .collect())
    }

    /// Read the live status of everything the chapter's stages depend on.
    pub async fn snapshot(&self, chapter_id: DbId) -> PipelineResult<StageSnapshot> {
        let store = &self.ctx.store;
        let mut snapshot = StageSnapshot {
            min_images: self.ctx.config.min_narration_images,
            outro_configured: self.outro_available().await?,
            ..Default::default()
        };

        if store.find_chapter(chapter_id).await?.is_none() {
            return Ok(snapshot);
        }
        snapshot.chapter_exists = true;

        snapshot.narration_videos = store
            .list_active_videos(chapter_id, VideoType::NarrationVideo)
            .await?
            .iter()
            .map(|v| (v.sequence, v.state()))
            .collect();

        let Some(narration) = store.find_active_narration(chapter_id).await? else {
            return Ok(snapshot);
        };
        snapshot.narration = Some(narration.state());
        if let Some(content) = narration.content() {
            snapshot.shots = content.shot_keys();
        }

        snapshot.audio = store
            .list_audio(narration.id)
            .await?
            .iter()
            .map(|a| (a.key(), a.state()))
            .collect::<HashMap<_, _>>();

        snapshot.subtitle = store
            .find_active_subtitle(narration.id)
            .await?
            .map(|s| s.state());

        // Distinct shots with at least one completed version.
        snapshot.completed_images = store
            .list_images(chapter_id)
            .await?
            .iter()
            .filter(|i| i.narration_id == narration.id && i.state() == UnitState::Completed)
            .map(|i| i.key())
            .collect::<HashSet<_>>()
            .len();

        Ok(snapshot)
    }

    async fn outro_available(&self) -> PipelineResult<bool> {
        match &self.ctx.config.outro_storage_key {
            Some(key) => Ok(self.ctx.blobs.exists(key).await?),
            None => Ok(false),
        }
    }
}
