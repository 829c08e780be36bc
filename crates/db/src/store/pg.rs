//! PostgreSQL implementation of the store capabilities.

use async_trait::async_trait;
use storyreel_core::chaptering::ChapterDraft;
use storyreel_core::lifecycle::UnitState;
use storyreel_core::narration::{NarrationContent, ShotKey};
use storyreel_core::types::DbId;

use super::{
    invalid_transition, AudioStore, ChapterStore, ImageStore, NarrationStore, NovelStore,
    ResourceStore, StoreError, StoreResult, SubtitleStore, VideoStore,
};
use crate::models::audio::Audio;
use crate::models::chapter::Chapter;
use crate::models::image::Image;
use crate::models::narration::Narration;
use crate::models::novel::{CreateNovel, Novel};
use crate::models::resource::{CreateResource, Resource};
use crate::models::status::{
    source_ids, GenerationStatus, ResourceStatus, StatusId, UnitStatus, VideoStatus, VideoType,
};
use crate::models::subtitle::Subtitle;
use crate::models::video::Video;
use crate::repositories::{
    AudioRepo, ChapterRepo, ImageRepo, NarrationRepo, NovelRepo, ResourceRepo, SubtitleRepo,
    VideoRepo,
};
use crate::DbPool;

/// Store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Explain why a guarded update touched no row.
fn not_applied(entity: &'static str, id: DbId, to: UnitState, exists: bool) -> StoreError {
    if exists {
        invalid_transition(entity, id, to)
    } else {
        StoreError::NotFound { entity, id }
    }
}

/// Target status ID and allowed source IDs for a transition to `to`.
fn plan<S: UnitStatus>(
    entity: &'static str,
    id: DbId,
    to: UnitState,
) -> StoreResult<(StatusId, Vec<StatusId>)> {
    let target = S::from_state(to).ok_or_else(|| invalid_transition(entity, id, to))?;
    Ok((target.id(), source_ids::<S>(to)))
}

// ---------------------------------------------------------------------------
// Resources and novels
// ---------------------------------------------------------------------------

#[async_trait]
impl ResourceStore for PgStore {
    async fn create_resource(&self, input: &CreateResource) -> StoreResult<Resource> {
        Ok(ResourceRepo::create(&self.pool, input).await?)
    }

    async fn find_resource(&self, id: DbId) -> StoreResult<Option<Resource>> {
        Ok(ResourceRepo::find_by_id(&self.pool, id).await?)
    }

    async fn mark_resource(
        &self,
        id: DbId,
        status: ResourceStatus,
        file_size: Option<i64>,
    ) -> StoreResult<Resource> {
        let allowed = [ResourceStatus::Pending.id()];
        match ResourceRepo::update_status(&self.pool, id, status.id(), &allowed, file_size).await? {
            Some(row) => Ok(row),
            None => {
                let exists = ResourceRepo::find_by_id(&self.pool, id).await?.is_some();
                if exists {
                    Err(StoreError::InvalidTransition {
                        entity: "resource",
                        id,
                        to: status.as_str().to_string(),
                    })
                } else {
                    Err(StoreError::NotFound {
                        entity: "resource",
                        id,
                    })
                }
            }
        }
    }

    async fn soft_delete_resource(&self, id: DbId) -> StoreResult<bool> {
        Ok(ResourceRepo::soft_delete(&self.pool, id).await?)
    }
}

#[async_trait]
impl NovelStore for PgStore {
    async fn create_novel(&self, input: &CreateNovel) -> StoreResult<Novel> {
        Ok(NovelRepo::create(&self.pool, input).await?)
    }

    async fn find_novel(&self, id: DbId) -> StoreResult<Option<Novel>> {
        Ok(NovelRepo::find_by_id(&self.pool, id).await?)
    }
}

// ---------------------------------------------------------------------------
// Chapters
// ---------------------------------------------------------------------------

#[async_trait]
impl ChapterStore for PgStore {
    async fn create_chapters(
        &self,
        novel_id: DbId,
        user_id: DbId,
        drafts: &[ChapterDraft],
    ) -> StoreResult<Vec<Chapter>> {
        let mut tx = self.pool.begin().await?;

        if ChapterRepo::lock_novel(&mut tx, novel_id).await?.is_none() {
            return Err(StoreError::NotFound {
                entity: "novel",
                id: novel_id,
            });
        }
        let existing = ChapterRepo::count_active(&mut tx, novel_id).await?;
        if existing > 0 {
            return Err(StoreError::Conflict(format!(
                "Novel {novel_id} already has {existing} chapters"
            )));
        }

        let mut chapters = Vec::with_capacity(drafts.len());
        for (idx, draft) in drafts.iter().enumerate() {
            let chapter = ChapterRepo::insert(
                &mut tx,
                novel_id,
                user_id,
                idx as i32 + 1,
                &draft.title,
                &draft.text,
            )
            .await?;
            chapters.push(chapter);
        }

        tx.commit().await?;
        Ok(chapters)
    }

    async fn find_chapter(&self, id: DbId) -> StoreResult<Option<Chapter>> {
        Ok(ChapterRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_chapters(&self, novel_id: DbId) -> StoreResult<Vec<Chapter>> {
        Ok(ChapterRepo::list_by_novel(&self.pool, novel_id).await?)
    }
}

// ---------------------------------------------------------------------------
// Narrations
// ---------------------------------------------------------------------------

#[async_trait]
impl NarrationStore for PgStore {
    async fn supersede_narration(
        &self,
        chapter_id: DbId,
        user_id: DbId,
    ) -> StoreResult<Narration> {
        let mut tx = self.pool.begin().await?;
        if ImageRepo::lock_chapter(&mut tx, chapter_id).await?.is_none() {
            return Err(StoreError::NotFound {
                entity: "chapter",
                id: chapter_id,
            });
        }
        let superseded = NarrationRepo::tombstone_active(&mut tx, chapter_id).await?;
        // Videos are cut from the narration's scenes and go stale with it.
        let stale_videos = VideoRepo::tombstone_chapter(&mut tx, chapter_id).await?;
        let narration = NarrationRepo::insert_pending(&mut tx, chapter_id, user_id).await?;
        tx.commit().await?;

        if superseded > 0 {
            tracing::info!(
                chapter_id,
                narration_id = narration.id,
                stale_videos,
                "Superseded active narration"
            );
        }
        Ok(narration)
    }

    async fn find_narration(&self, id: DbId) -> StoreResult<Option<Narration>> {
        Ok(NarrationRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_active_narration(&self, chapter_id: DbId) -> StoreResult<Option<Narration>> {
        Ok(NarrationRepo::find_active_by_chapter(&self.pool, chapter_id).await?)
    }

    async fn complete_narration(
        &self,
        id: DbId,
        content: &NarrationContent,
    ) -> StoreResult<Narration> {
        let (target, allowed) = plan::<GenerationStatus>("narration", id, UnitState::Completed)?;
        match NarrationRepo::transition(&self.pool, id, target, &allowed, Some(content), None)
            .await?
        {
            Some(row) => Ok(row),
            None => {
                let exists = NarrationRepo::find_by_id(&self.pool, id).await?.is_some();
                Err(not_applied("narration", id, UnitState::Completed, exists))
            }
        }
    }

    async fn fail_narration(&self, id: DbId, message: &str) -> StoreResult<Narration> {
        let (target, allowed) = plan::<GenerationStatus>("narration", id, UnitState::Failed)?;
        match NarrationRepo::transition(&self.pool, id, target, &allowed, None, Some(message))
            .await?
        {
            Some(row) => Ok(row),
            None => {
                let exists = NarrationRepo::find_by_id(&self.pool, id).await?.is_some();
                Err(not_applied("narration", id, UnitState::Failed, exists))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

impl PgStore {
    async fn transition_audio(
        &self,
        id: DbId,
        to: UnitState,
        storage_key: Option<&str>,
        duration_ms: Option<i64>,
        message: Option<&str>,
    ) -> StoreResult<Audio> {
        let (target, allowed) = plan::<GenerationStatus>("audio", id, to)?;
        match AudioRepo::transition(
            &self.pool,
            id,
            target,
            &allowed,
            storage_key,
            duration_ms,
            message,
        )
        .await?
        {
            Some(row) => Ok(row),
            None => {
                let exists = AudioRepo::find_by_id(&self.pool, id).await?.is_some();
                Err(not_applied("audio", id, to, exists))
            }
        }
    }
}

#[async_trait]
impl AudioStore for PgStore {
    async fn create_pending_audio(
        &self,
        narration_id: DbId,
        keys: &[ShotKey],
    ) -> StoreResult<Vec<Audio>> {
        let mut tx = self.pool.begin().await?;
        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            rows.push(AudioRepo::insert_pending(&mut tx, narration_id, *key).await?);
        }
        tx.commit().await?;
        Ok(rows)
    }

    async fn find_audio(&self, id: DbId) -> StoreResult<Option<Audio>> {
        Ok(AudioRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_audio(&self, narration_id: DbId) -> StoreResult<Vec<Audio>> {
        Ok(AudioRepo::list_by_narration(&self.pool, narration_id).await?)
    }

    async fn reset_audio(&self, id: DbId) -> StoreResult<Audio> {
        self.transition_audio(id, UnitState::Pending, None, None, None)
            .await
    }

    async fn complete_audio(
        &self,
        id: DbId,
        storage_key: &str,
        duration_ms: i64,
    ) -> StoreResult<Audio> {
        self.transition_audio(
            id,
            UnitState::Completed,
            Some(storage_key),
            Some(duration_ms),
            None,
        )
        .await
    }

    async fn fail_audio(&self, id: DbId, message: &str) -> StoreResult<Audio> {
        self.transition_audio(id, UnitState::Failed, None, None, Some(message))
            .await
    }
}

// ---------------------------------------------------------------------------
// Subtitles
// ---------------------------------------------------------------------------

#[async_trait]
impl SubtitleStore for PgStore {
    async fn supersede_subtitle(&self, narration_id: DbId) -> StoreResult<Subtitle> {
        let mut tx = self.pool.begin().await?;
        SubtitleRepo::tombstone_active(&mut tx, narration_id).await?;
        let subtitle = SubtitleRepo::insert_pending(&mut tx, narration_id).await?;
        tx.commit().await?;
        Ok(subtitle)
    }

    async fn find_subtitle(&self, id: DbId) -> StoreResult<Option<Subtitle>> {
        Ok(SubtitleRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_active_subtitle(&self, narration_id: DbId) -> StoreResult<Option<Subtitle>> {
        Ok(SubtitleRepo::find_active_by_narration(&self.pool, narration_id).await?)
    }

    async fn complete_subtitle(
        &self,
        id: DbId,
        storage_key: &str,
        cue_count: i32,
    ) -> StoreResult<Subtitle> {
        let (target, allowed) = plan::<GenerationStatus>("subtitle", id, UnitState::Completed)?;
        match SubtitleRepo::transition(
            &self.pool,
            id,
            target,
            &allowed,
            Some(storage_key),
            Some(cue_count),
            None,
        )
        .await?
        {
            Some(row) => Ok(row),
            None => {
                let exists = SubtitleRepo::find_by_id(&self.pool, id).await?.is_some();
                Err(not_applied("subtitle", id, UnitState::Completed, exists))
            }
        }
    }

    async fn fail_subtitle(&self, id: DbId, message: &str) -> StoreResult<Subtitle> {
        let (target, allowed) = plan::<GenerationStatus>("subtitle", id, UnitState::Failed)?;
        match SubtitleRepo::transition(&self.pool, id, target, &allowed, None, None, Some(message))
            .await?
        {
            Some(row) => Ok(row),
            None => {
                let exists = SubtitleRepo::find_by_id(&self.pool, id).await?.is_some();
                Err(not_applied("subtitle", id, UnitState::Failed, exists))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

impl PgStore {
    async fn transition_image(
        &self,
        id: DbId,
        to: UnitState,
        storage_key: Option<&str>,
        message: Option<&str>,
    ) -> StoreResult<Image> {
        let (target, allowed) = plan::<GenerationStatus>("image", id, to)?;
        match ImageRepo::transition(&self.pool, id, target, &allowed, storage_key, message).await? {
            Some(row) => Ok(row),
            None => {
                let exists = ImageRepo::find_by_id(&self.pool, id).await?.is_some();
                Err(not_applied("image", id, to, exists))
            }
        }
    }
}

#[async_trait]
impl ImageStore for PgStore {
    async fn allocate_image_versions(
        &self,
        chapter_id: DbId,
        narration_id: DbId,
        keys: &[ShotKey],
    ) -> StoreResult<Vec<Image>> {
        let mut tx = self.pool.begin().await?;
        if ImageRepo::lock_chapter(&mut tx, chapter_id).await?.is_none() {
            return Err(StoreError::NotFound {
                entity: "chapter",
                id: chapter_id,
            });
        }
        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            rows.push(ImageRepo::insert_next_version(&mut tx, chapter_id, narration_id, *key).await?);
        }
        tx.commit().await?;
        Ok(rows)
    }

    async fn find_image(&self, id: DbId) -> StoreResult<Option<Image>> {
        Ok(ImageRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_images(&self, chapter_id: DbId) -> StoreResult<Vec<Image>> {
        Ok(ImageRepo::list_by_chapter(&self.pool, chapter_id).await?)
    }

    async fn reset_image(&self, id: DbId) -> StoreResult<Image> {
        self.transition_image(id, UnitState::Pending, None, None).await
    }

    async fn complete_image(&self, id: DbId, storage_key: &str) -> StoreResult<Image> {
        self.transition_image(id, UnitState::Completed, Some(storage_key), None)
            .await
    }

    async fn fail_image(&self, id: DbId, message: &str) -> StoreResult<Image> {
        self.transition_image(id, UnitState::Failed, None, Some(message))
            .await
    }
}

// ---------------------------------------------------------------------------
// Videos
// ---------------------------------------------------------------------------

impl PgStore {
    async fn transition_video(
        &self,
        id: DbId,
        to: UnitState,
        storage_key: Option<&str>,
        provider_job_id: Option<&str>,
        message: Option<&str>,
    ) -> StoreResult<Video> {
        let (target, allowed) = plan::<VideoStatus>("video", id, to)?;
        match VideoRepo::transition(
            &self.pool,
            id,
            target,
            &allowed,
            storage_key,
            provider_job_id,
            message,
        )
        .await?
        {
            Some(row) => Ok(row),
            None => {
                let exists = VideoRepo::find_by_id(&self.pool, id).await?.is_some();
                Err(not_applied("video", id, to, exists))
            }
        }
    }
}

#[async_trait]
impl VideoStore for PgStore {
    async fn replace_videos(
        &self,
        chapter_id: DbId,
        user_id: DbId,
        video_type: VideoType,
        sequences: &[i32],
    ) -> StoreResult<Vec<Video>> {
        let mut tx = self.pool.begin().await?;
        if ImageRepo::lock_chapter(&mut tx, chapter_id).await?.is_none() {
            return Err(StoreError::NotFound {
                entity: "chapter",
                id: chapter_id,
            });
        }
        VideoRepo::tombstone_active(&mut tx, chapter_id, video_type.id()).await?;
        let mut rows = Vec::with_capacity(sequences.len());
        for sequence in sequences {
            rows.push(
                VideoRepo::insert_pending(&mut tx, chapter_id, user_id, video_type.id(), *sequence)
                    .await?,
            );
        }
        tx.commit().await?;
        Ok(rows)
    }

    async fn find_video(&self, id: DbId) -> StoreResult<Option<Video>> {
        Ok(VideoRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_active_videos(
        &self,
        chapter_id: DbId,
        video_type: VideoType,
    ) -> StoreResult<Vec<Video>> {
        Ok(VideoRepo::list_active(&self.pool, chapter_id, video_type.id()).await?)
    }

    async fn start_video(&self, id: DbId, provider_job_id: &str) -> StoreResult<Video> {
        self.transition_video(id, UnitState::Processing, None, Some(provider_job_id), None)
            .await
    }

    async fn complete_video(&self, id: DbId, storage_key: &str) -> StoreResult<Video> {
        self.transition_video(id, UnitState::Completed, Some(storage_key), None, None)
            .await
    }

    async fn fail_video(&self, id: DbId, message: &str) -> StoreResult<Video> {
        self.transition_video(id, UnitState::Failed, None, None, Some(message))
            .await
    }
}
