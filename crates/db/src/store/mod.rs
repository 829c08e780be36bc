//! Capability store traits.
//!
//! The pipeline never talks to a concrete database. It depends on these
//! per-entity capabilities (read-by-id, read-by-parent, write, status
//! transition), which [`PgStore`] implements over the repositories and
//! [`MemoryStore`] implements in process for tests and dry runs.
//!
//! Every read filters out tombstoned rows. Every status change is a
//! single guarded update that fails with [`StoreError::InvalidTransition`]
//! when the row is not in a state the target may follow.

use async_trait::async_trait;
use storyreel_core::chaptering::ChapterDraft;
use storyreel_core::lifecycle::UnitState;
use storyreel_core::narration::{NarrationContent, ShotKey};
use storyreel_core::types::DbId;

use crate::models::audio::Audio;
use crate::models::chapter::Chapter;
use crate::models::image::Image;
use crate::models::narration::Narration;
use crate::models::novel::{CreateNovel, Novel};
use crate::models::resource::{CreateResource, Resource};
use crate::models::status::{ResourceStatus, VideoType};
use crate::models::subtitle::Subtitle;
use crate::models::video::Video;

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{entity} {id} cannot move to '{to}' from its current status")]
    InvalidTransition {
        entity: &'static str,
        id: DbId,
        to: String,
    },

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    /// Unique violations on `uq_` constraints become conflicts.
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return StoreError::Conflict(format!(
                        "Duplicate value violates unique constraint: {constraint}"
                    ));
                }
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Register a resource in `pending` status.
    async fn create_resource(&self, input: &CreateResource) -> StoreResult<Resource>;

    async fn find_resource(&self, id: DbId) -> StoreResult<Option<Resource>>;

    /// Move a `pending` resource to `ready` or `failed`. Ready resources
    /// are immutable.
    async fn mark_resource(
        &self,
        id: DbId,
        status: ResourceStatus,
        file_size: Option<i64>,
    ) -> StoreResult<Resource>;

    async fn soft_delete_resource(&self, id: DbId) -> StoreResult<bool>;
}

#[async_trait]
pub trait NovelStore: Send + Sync {
    async fn create_novel(&self, input: &CreateNovel) -> StoreResult<Novel>;

    async fn find_novel(&self, id: DbId) -> StoreResult<Option<Novel>>;
}

#[async_trait]
pub trait ChapterStore: Send + Sync {
    /// Insert all chapters of a novel atomically, numbering them `1..=N`.
    ///
    /// Fails with [`StoreError::Conflict`] if the novel already has
    /// active chapters.
    async fn create_chapters(
        &self,
        novel_id: DbId,
        user_id: DbId,
        drafts: &[ChapterDraft],
    ) -> StoreResult<Vec<Chapter>>;

    async fn find_chapter(&self, id: DbId) -> StoreResult<Option<Chapter>>;

    /// Active chapters in sequence order.
    async fn list_chapters(&self, novel_id: DbId) -> StoreResult<Vec<Chapter>>;
}

#[async_trait]
pub trait NarrationStore: Send + Sync {
    /// Insert a new `pending` narration for the chapter and tombstone the
    /// previously active one, atomically. The chapter's active videos of
    /// every type are tombstoned in the same step.
    async fn supersede_narration(&self, chapter_id: DbId, user_id: DbId)
        -> StoreResult<Narration>;

    async fn find_narration(&self, id: DbId) -> StoreResult<Option<Narration>>;

    async fn find_active_narration(&self, chapter_id: DbId) -> StoreResult<Option<Narration>>;

    async fn complete_narration(
        &self,
        id: DbId,
        content: &NarrationContent,
    ) -> StoreResult<Narration>;

    async fn fail_narration(&self, id: DbId, message: &str) -> StoreResult<Narration>;
}

#[async_trait]
pub trait AudioStore: Send + Sync {
    /// Insert `pending` audio rows for `keys` atomically.
    async fn create_pending_audio(&self, narration_id: DbId, keys: &[ShotKey])
        -> StoreResult<Vec<Audio>>;

    async fn find_audio(&self, id: DbId) -> StoreResult<Option<Audio>>;

    /// Active audio of a narration in scene/shot order.
    async fn list_audio(&self, narration_id: DbId) -> StoreResult<Vec<Audio>>;

    /// Put a failed clip back to `pending` for a retry.
    async fn reset_audio(&self, id: DbId) -> StoreResult<Audio>;

    async fn complete_audio(
        &self,
        id: DbId,
        storage_key: &str,
        duration_ms: i64,
    ) -> StoreResult<Audio>;

    async fn fail_audio(&self, id: DbId, message: &str) -> StoreResult<Audio>;
}

#[async_trait]
pub trait SubtitleStore: Send + Sync {
    /// Insert a new `pending` subtitle and tombstone the previous one,
    /// atomically.
    async fn supersede_subtitle(&self, narration_id: DbId) -> StoreResult<Subtitle>;

    async fn find_subtitle(&self, id: DbId) -> StoreResult<Option<Subtitle>>;

    async fn find_active_subtitle(&self, narration_id: DbId) -> StoreResult<Option<Subtitle>>;

    async fn complete_subtitle(
        &self,
        id: DbId,
        storage_key: &str,
        cue_count: i32,
    ) -> StoreResult<Subtitle>;

    async fn fail_subtitle(&self, id: DbId, message: &str) -> StoreResult<Subtitle>;
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Insert one `pending` image per key, each with its key's next
    /// version number. The whole batch is allocated atomically.
    async fn allocate_image_versions(
        &self,
        chapter_id: DbId,
        narration_id: DbId,
        keys: &[ShotKey],
    ) -> StoreResult<Vec<Image>>;

    async fn find_image(&self, id: DbId) -> StoreResult<Option<Image>>;

    /// Every active version of a chapter's images, ordered by shot then
    /// version.
    async fn list_images(&self, chapter_id: DbId) -> StoreResult<Vec<Image>>;

    async fn reset_image(&self, id: DbId) -> StoreResult<Image>;

    async fn complete_image(&self, id: DbId, storage_key: &str) -> StoreResult<Image>;

    async fn fail_image(&self, id: DbId, message: &str) -> StoreResult<Image>;
}

#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Tombstone the chapter's active videos of `video_type` and insert one
    /// `pending` video per sequence, atomically.
    async fn replace_videos(
        &self,
        chapter_id: DbId,
        user_id: DbId,
        video_type: VideoType,
        sequences: &[i32],
    ) -> StoreResult<Vec<Video>>;

    async fn find_video(&self, id: DbId) -> StoreResult<Option<Video>>;

    /// Active videos of one type in sequence order.
    async fn list_active_videos(
        &self,
        chapter_id: DbId,
        video_type: VideoType,
    ) -> StoreResult<Vec<Video>>;

    /// `pending -> processing`, recording the provider job id.
    async fn start_video(&self, id: DbId, provider_job_id: &str) -> StoreResult<Video>;

    async fn complete_video(&self, id: DbId, storage_key: &str) -> StoreResult<Video>;

    async fn fail_video(&self, id: DbId, message: &str) -> StoreResult<Video>;
}

/// Every capability the pipeline needs, in one object.
pub trait PipelineStore:
    ResourceStore
    + NovelStore
    + ChapterStore
    + NarrationStore
    + AudioStore
    + SubtitleStore
    + ImageStore
    + VideoStore
{
}

impl<T> PipelineStore for T where
    T: ResourceStore
        + NovelStore
        + ChapterStore
        + NarrationStore
        + AudioStore
        + SubtitleStore
        + ImageStore
        + VideoStore
{
}

pub(crate) fn invalid_transition(entity: &'static str, id: DbId, to: UnitState) -> StoreError {
    StoreError::InvalidTransition {
        entity,
        id,
        to: to.as_str().to_string(),
    }
}
