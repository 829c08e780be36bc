//! Video entity model.

use serde::Serialize;
use sqlx::FromRow;
use storyreel_core::lifecycle::UnitState;
use storyreel_core::types::{DbId, Timestamp};

use crate::models::status::{unit_state, StatusId, VideoStatus, VideoType};

/// A row from the `videos` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Video {
    pub id: DbId,
    pub chapter_id: DbId,
    pub user_id: DbId,
    pub video_type_id: StatusId,
    /// Ordering within the type. Final videos always carry 1.
    pub sequence: i32,
    pub storage_key: Option<String>,
    /// Provider job id while the video is `processing`.
    pub provider_job_id: Option<String>,
    pub status_id: StatusId,
    pub error_message: Option<String>,
    pub deleted_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Video {
    pub fn state(&self) -> UnitState {
        unit_state::<VideoStatus>(self.status_id)
    }

    pub fn video_type(&self) -> Option<VideoType> {
        VideoType::from_id(self.video_type_id)
    }
}
