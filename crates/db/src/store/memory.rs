//! In-process implementation of the store capabilities.
//!
//! Each [`MemoryStore`] owns its own state, so tests build an isolated
//! instance instead of sharing a database fixture. All operations hold a
//! single lock, which makes every multi-row write atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use storyreel_core::chaptering::ChapterDraft;
use storyreel_core::lifecycle::UnitState;
use storyreel_core::narration::{NarrationContent, ShotKey};
use storyreel_core::types::DbId;
use tokio::sync::Mutex;

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
    unit_state, GenerationStatus, ResourceStatus, StatusId, UnitStatus, VideoStatus, VideoType,
};
use crate::models::subtitle::Subtitle;
use crate::models::video::Video;

#[derive(Default)]
struct State {
    next_id: DbId,
    resources: HashMap<DbId, Resource>,
    novels: HashMap<DbId, Novel>,
    chapters: HashMap<DbId, Chapter>,
    narrations: HashMap<DbId, Narration>,
    audios: HashMap<DbId, Audio>,
    subtitles: HashMap<DbId, Subtitle>,
    images: HashMap<DbId, Image>,
    videos: HashMap<DbId, Video>,
}

impl State {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }
}

/// Store that keeps every table in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in the `audios` table, tombstoned ones included.
    pub async fn audio_row_count(&self) -> usize {
        self.state.lock().await.audios.len()
    }

    /// Number of rows in the `subtitles` table, tombstoned ones included.
    pub async fn subtitle_row_count(&self) -> usize {
        self.state.lock().await.subtitles.len()
    }

    /// Number of rows in the `videos` table, tombstoned ones included.
    pub async fn video_row_count(&self) -> usize {
        self.state.lock().await.videos.len()
    }
}

/// Compute the status ID for a guarded transition of a row currently at
/// `current`, or the error explaining why it is not allowed.
fn check<S: UnitStatus>(
    entity: &'static str,
    id: DbId,
    current: StatusId,
    to: UnitState,
) -> StoreResult<StatusId> {
    let target = S::from_state(to).ok_or_else(|| invalid_transition(entity, id, to))?;
    if unit_state::<S>(current).can_transition_to(to) && S::from_id(current).is_some() {
        Ok(target.id())
    } else {
        Err(invalid_transition(entity, id, to))
    }
}

fn active<'a, T>(row: Option<&'a T>, is_deleted: impl Fn(&T) -> bool) -> Option<&'a T> {
    row.filter(|r| !is_deleted(r))
}

// ---------------------------------------------------------------------------
// Resources and novels
// ---------------------------------------------------------------------------

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn create_resource(&self, input: &CreateResource) -> StoreResult<Resource> {
        let mut state = self.state.lock().await;
        if state
            .resources
            .values()
            .any(|r| r.deleted_at.is_none() && r.storage_key == input.storage_key)
        {
            return Err(StoreError::Conflict(format!(
                "Storage key '{}' is already registered",
                input.storage_key
            )));
        }
        let now = Utc::now();
        let row = Resource {
            id: state.next_id(),
            user_id: input.user_id,
            name: input.name.clone(),
            ext: input.ext.clone(),
            file_size: input.file_size,
            content_type: input.content_type.clone(),
            storage_key: input.storage_key.clone(),
            storage_type: input.storage_type.clone(),
            status_id: ResourceStatus::Pending.id(),
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        state.resources.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_resource(&self, id: DbId) -> StoreResult<Option<Resource>> {
        let state = self.state.lock().await;
        Ok(active(state.resources.get(&id), |r| r.deleted_at.is_some()).cloned())
    }

    async fn mark_resource(
        &self,
        id: DbId,
        status: ResourceStatus,
        file_size: Option<i64>,
    ) -> StoreResult<Resource> {
        let mut state = self.state.lock().await;
        let row = state
            .resources
            .get_mut(&id)
            .filter(|r| r.deleted_at.is_none())
            .ok_or(StoreError::NotFound {
                entity: "resource",
                id,
            })?;
        if row.status_id != ResourceStatus::Pending.id() {
            return Err(StoreError::InvalidTransition {
                entity: "resource",
                id,
                to: status.as_str().to_string(),
            });
        }
        row.status_id = status.id();
        if let Some(size) = file_size {
            row.file_size = size;
        }
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn soft_delete_resource(&self, id: DbId) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state
            .resources
            .get_mut(&id)
            .filter(|r| r.deleted_at.is_none())
        {
            Some(row) => {
                row.deleted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl NovelStore for MemoryStore {
    async fn create_novel(&self, input: &CreateNovel) -> StoreResult<Novel> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let row = Novel {
            id: state.next_id(),
            resource_id: input.resource_id,
            user_id: input.user_id,
            style: input.style.clone(),
            narration_type: input.narration_type.clone(),
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        state.novels.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_novel(&self, id: DbId) -> StoreResult<Option<Novel>> {
        let state = self.state.lock().await;
        Ok(active(state.novels.get(&id), |r| r.deleted_at.is_some()).cloned())
    }
}

// ---------------------------------------------------------------------------
// Chapters
// ---------------------------------------------------------------------------

#[async_trait]
impl ChapterStore for MemoryStore {
    async fn create_chapters(
        &self,
        novel_id: DbId,
        user_id: DbId,
        drafts: &[ChapterDraft],
    ) -> StoreResult<Vec<Chapter>> {
        let mut state = self.state.lock().await;
        if active(state.novels.get(&novel_id), |r| r.deleted_at.is_some()).is_none() {
            return Err(StoreError::NotFound {
                entity: "novel",
                id: novel_id,
            });
        }
        let existing = state
            .chapters
            .values()
            .filter(|c| c.novel_id == novel_id && c.deleted_at.is_none())
            .count();
        if existing > 0 {
            return Err(StoreError::Conflict(format!(
                "Novel {novel_id} already has {existing} chapters"
            )));
        }

        let now = Utc::now();
        let mut rows = Vec::with_capacity(drafts.len());
        for (idx, draft) in drafts.iter().enumerate() {
            let row = Chapter {
                id: state.next_id(),
                novel_id,
                user_id,
                sequence: idx as i32 + 1,
                title: draft.title.clone(),
                chapter_text: draft.text.clone(),
                deleted_at: None,
                created_at: now,
                updated_at: now,
            };
            state.chapters.insert(row.id, row.clone());
            rows.push(row);
        }
        Ok(rows)
    }

    async fn find_chapter(&self, id: DbId) -> StoreResult<Option<Chapter>> {
        let state = self.state.lock().await;
        Ok(active(state.chapters.get(&id), |r| r.deleted_at.is_some()).cloned())
    }

    async fn list_chapters(&self, novel_id: DbId) -> StoreResult<Vec<Chapter>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Chapter> = state
            .chapters
            .values()
            .filter(|c| c.novel_id == novel_id && c.deleted_at.is_none())
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.sequence);
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Narrations
// ---------------------------------------------------------------------------

impl MemoryStore {
    async fn transition_narration(
        &self,
        id: DbId,
        to: UnitState,
        content: Option<&NarrationContent>,
        message: Option<&str>,
    ) -> StoreResult<Narration> {
        let mut state = self.state.lock().await;
        let row = state
            .narrations
            .get_mut(&id)
            .filter(|r| r.deleted_at.is_none())
            .ok_or(StoreError::NotFound {
                entity: "narration",
                id,
            })?;
        row.status_id = check::<GenerationStatus>("narration", id, row.status_id, to)?;
        if let Some(content) = content {
            row.content = Some(Json(content.clone()));
        }
        row.error_message = message.map(str::to_string);
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}

#[async_trait]
impl NarrationStore for MemoryStore {
    async fn supersede_narration(
        &self,
        chapter_id: DbId,
        user_id: DbId,
    ) -> StoreResult<Narration> {
        let mut state = self.state.lock().await;
        if active(state.chapters.get(&chapter_id), |r| r.deleted_at.is_some()).is_none() {
            return Err(StoreError::NotFound {
                entity: "chapter",
                id: chapter_id,
            });
        }
        let now = Utc::now();
        for row in state.narrations.values_mut() {
            if row.chapter_id == chapter_id && row.deleted_at.is_none() {
                row.deleted_at = Some(now);
            }
        }
        for row in state.videos.values_mut() {
            if row.chapter_id == chapter_id && row.deleted_at.is_none() {
                row.deleted_at = Some(now);
            }
        }
        let row = Narration {
            id: state.next_id(),
            chapter_id,
            user_id,
            content: None,
            status_id: GenerationStatus::Pending.id(),
            error_message: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        state.narrations.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_narration(&self, id: DbId) -> StoreResult<Option<Narration>> {
        let state = self.state.lock().await;
        Ok(active(state.narrations.get(&id), |r| r.deleted_at.is_some()).cloned())
    }

    async fn find_active_narration(&self, chapter_id: DbId) -> StoreResult<Option<Narration>> {
        let state = self.state.lock().await;
        Ok(state
            .narrations
            .values()
            .find(|n| n.chapter_id == chapter_id && n.deleted_at.is_none())
            .cloned())
    }

    async fn complete_narration(
        &self,
        id: DbId,
        content: &NarrationContent,
    ) -> StoreResult<Narration> {
        self.transition_narration(id, UnitState::Completed, Some(content), None)
            .await
    }

    async fn fail_narration(&self, id: DbId, message: &str) -> StoreResult<Narration> {
        self.transition_narration(id, UnitState::Failed, None, Some(message))
            .await
    }
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

impl MemoryStore {
    async fn transition_audio(
        &self,
        id: DbId,
        to: UnitState,
        storage_key: Option<&str>,
        duration_ms: Option<i64>,
        message: Option<&str>,
    ) -> StoreResult<Audio> {
        let mut state = self.state.lock().await;
        let row = state
            .audios
            .get_mut(&id)
            .filter(|r| r.deleted_at.is_none())
            .ok_or(StoreError::NotFound { entity: "audio", id })?;
        row.status_id = check::<GenerationStatus>("audio", id, row.status_id, to)?;
        if let Some(key) = storage_key {
            row.storage_key = Some(key.to_string());
        }
        if let Some(ms) = duration_ms {
            row.duration_ms = Some(ms);
        }
        row.error_message = message.map(str::to_string);
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}

#[async_trait]
impl AudioStore for MemoryStore {
    async fn create_pending_audio(
        &self,
        narration_id: DbId,
        keys: &[ShotKey],
    ) -> StoreResult<Vec<Audio>> {
        let mut state = self.state.lock().await;
        for key in keys {
            let taken = state.audios.values().any(|a| {
                a.narration_id == narration_id && a.deleted_at.is_none() && a.key() == *key
            });
            if taken {
                return Err(StoreError::Conflict(format!(
                    "Audio for {key} of narration {narration_id} already exists"
                )));
            }
        }
        let now = Utc::now();
        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            let row = Audio {
                id: state.next_id(),
                narration_id,
                scene_number: key.scene_number,
                shot_number: key.shot_number,
                storage_key: None,
                duration_ms: None,
                status_id: GenerationStatus::Pending.id(),
                error_message: None,
                deleted_at: None,
                created_at: now,
                updated_at: now,
            };
            state.audios.insert(row.id, row.clone());
            rows.push(row);
        }
        Ok(rows)
    }

    async fn find_audio(&self, id: DbId) -> StoreResult<Option<Audio>> {
        let state = self.state.lock().await;
        Ok(active(state.audios.get(&id), |r| r.deleted_at.is_some()).cloned())
    }

    async fn list_audio(&self, narration_id: DbId) -> StoreResult<Vec<Audio>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Audio> = state
            .audios
            .values()
            .filter(|a| a.narration_id == narration_id && a.deleted_at.is_none())
            .cloned()
            .collect();
        rows.sort_by_key(Audio::key);
        Ok(rows)
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

impl MemoryStore {
    async fn transition_subtitle(
        &self,
        id: DbId,
        to: UnitState,
        storage_key: Option<&str>,
        cue_count: Option<i32>,
        message: Option<&str>,
    ) -> StoreResult<Subtitle> {
        let mut state = self.state.lock().await;
        let row = state
            .subtitles
            .get_mut(&id)
            .filter(|r| r.deleted_at.is_none())
            .ok_or(StoreError::NotFound {
                entity: "subtitle",
                id,
            })?;
        row.status_id = check::<GenerationStatus>("subtitle", id, row.status_id, to)?;
        if let Some(key) = storage_key {
            row.storage_key = Some(key.to_string());
        }
        if let Some(count) = cue_count {
            row.cue_count = Some(count);
        }
        row.error_message = message.map(str::to_string);
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}

#[async_trait]
impl SubtitleStore for MemoryStore {
    async fn supersede_subtitle(&self, narration_id: DbId) -> StoreResult<Subtitle> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        for row in state.subtitles.values_mut() {
            if row.narration_id == narration_id && row.deleted_at.is_none() {
                row.deleted_at = Some(now);
            }
        }
        let row = Subtitle {
            id: state.next_id(),
            narration_id,
            storage_key: None,
            cue_count: None,
            status_id: GenerationStatus::Pending.id(),
            error_message: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        state.subtitles.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_subtitle(&self, id: DbId) -> StoreResult<Option<Subtitle>> {
        let state = self.state.lock().await;
        Ok(active(state.subtitles.get(&id), |r| r.deleted_at.is_some()).cloned())
    }

    async fn find_active_subtitle(&self, narration_id: DbId) -> StoreResult<Option<Subtitle>> {
        let state = self.state.lock().await;
        Ok(state
            .subtitles
            .values()
            .find(|s| s.narration_id == narration_id && s.deleted_at.is_none())
            .cloned())
    }

    async fn complete_subtitle(
        &self,
        id: DbId,
        storage_key: &str,
        cue_count: i32,
    ) -> StoreResult<Subtitle> {
        self.transition_subtitle(id, UnitState::Completed, Some(storage_key), Some(cue_count), None)
            .await
    }

    async fn fail_subtitle(&self, id: DbId, message: &str) -> StoreResult<Subtitle> {
        self.transition_subtitle(id, UnitState::Failed, None, None, Some(message))
            .await
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

impl MemoryStore {
    async fn transition_image(
        &self,
        id: DbId,
        to: UnitState,
        storage_key: Option<&str>,
        message: Option<&str>,
    ) -> StoreResult<Image> {
        let mut state = self.state.lock().await;
        let row = state
            .images
            .get_mut(&id)
            .filter(|r| r.deleted_at.is_none())
            .ok_or(StoreError::NotFound { entity: "image", id })?;
        row.status_id = check::<GenerationStatus>("image", id, row.status_id, to)?;
        if let Some(key) = storage_key {
            row.storage_key = Some(key.to_string());
        }
        row.error_message = message.map(str::to_string);
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}

#[async_trait]
impl ImageStore for MemoryStore {
    async fn allocate_image_versions(
        &self,
        chapter_id: DbId,
        narration_id: DbId,
        keys: &[ShotKey],
    ) -> StoreResult<Vec<Image>> {
        let mut state = self.state.lock().await;
        if active(state.chapters.get(&chapter_id), |r| r.deleted_at.is_some()).is_none() {
            return Err(StoreError::NotFound {
                entity: "chapter",
                id: chapter_id,
            });
        }
        let now = Utc::now();
        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            // Tombstoned versions count, so numbers are never reused.
            let version = state
                .images
                .values()
                .filter(|i| i.chapter_id == chapter_id && i.key() == *key)
                .map(|i| i.version)
                .max()
                .unwrap_or(0)
                + 1;
            let row = Image {
                id: state.next_id(),
                chapter_id,
                narration_id,
                scene_number: key.scene_number,
                shot_number: key.shot_number,
                version,
                storage_key: None,
                status_id: GenerationStatus::Pending.id(),
                error_message: None,
                deleted_at: None,
                created_at: now,
                updated_at: now,
            };
            state.images.insert(row.id, row.clone());
            rows.push(row);
        }
        Ok(rows)
    }

    async fn find_image(&self, id: DbId) -> StoreResult<Option<Image>> {
        let state = self.state.lock().await;
        Ok(active(state.images.get(&id), |r| r.deleted_at.is_some()).cloned())
    }

    async fn list_images(&self, chapter_id: DbId) -> StoreResult<Vec<Image>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Image> = state
            .images
            .values()
            .filter(|i| i.chapter_id == chapter_id && i.deleted_at.is_none())
            .cloned()
            .collect();
        rows.sort_by_key(|i| (i.key(), i.version));
        Ok(rows)
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

impl MemoryStore {
    async fn transition_video(
        &self,
        id: DbId,
        to: UnitState,
        storage_key: Option<&str>,
        provider_job_id: Option<&str>,
        message: Option<&str>,
    ) -> StoreResult<Video> {
        let mut state = self.state.lock().await;
        let row = state
            .videos
            .get_mut(&id)
            .filter(|r| r.deleted_at.is_none())
            .ok_or(StoreError::NotFound { entity: "video", id })?;
        row.status_id = check::<VideoStatus>("video", id, row.status_id, to)?;
        if let Some(key) = storage_key {
            row.storage_key = Some(key.to_string());
        }
        if let Some(job) = provider_job_id {
            row.provider_job_id = Some(job.to_string());
        }
        row.error_message = message.map(str::to_string);
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}

#[async_trait]
impl VideoStore for MemoryStore {
    async fn replace_videos(
        &self,
        chapter_id: DbId,
        user_id: DbId,
        video_type: VideoType,
        sequences: &[i32],
    ) -> StoreResult<Vec<Video>> {
        let mut state = self.state.lock().await;
        if active(state.chapters.get(&chapter_id), |r| r.deleted_at.is_some()).is_none() {
            return Err(StoreError::NotFound {
                entity: "chapter",
                id: chapter_id,
            });
        }
        let now = Utc::now();
        for row in state.videos.values_mut() {
            if row.chapter_id == chapter_id
                && row.video_type_id == video_type.id()
                && row.deleted_at.is_none()
            {
                row.deleted_at = Some(now);
            }
        }
        let mut rows = Vec::with_capacity(sequences.len());
        for sequence in sequences {
            let row = Video {
                id: state.next_id(),
                chapter_id,
                user_id,
                video_type_id: video_type.id(),
                sequence: *sequence,
                storage_key: None,
                provider_job_id: None,
                status_id: VideoStatus::Pending.id(),
                error_message: None,
                deleted_at: None,
                created_at: now,
                updated_at: now,
            };
            state.videos.insert(row.id, row.clone());
            rows.push(row);
        }
        Ok(rows)
    }

    async fn find_video(&self, id: DbId) -> StoreResult<Option<Video>> {
        let state = self.state.lock().await;
        Ok(active(state.videos.get(&id), |r| r.deleted_at.is_some()).cloned())
    }

    async fn list_active_videos(
        &self,
        chapter_id: DbId,
        video_type: VideoType,
    ) -> StoreResult<Vec<Video>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Video> = state
            .videos
            .values()
            .filter(|v| {
                v.chapter_id == chapter_id
                    && v.video_type_id == video_type.id()
                    && v.deleted_at.is_none()
            })
            .cloned()
            .collect();
        rows.sort_by_key(|v| v.sequence);
        Ok(rows)
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

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
