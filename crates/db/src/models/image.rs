//! Image entity model.

use serde::Serialize;
use sqlx::FromRow;
use storyreel_core::lifecycle::UnitState;
use storyreel_core::narration::ShotKey;
use storyreel_core::types::{DbId, Timestamp};

use crate::models::status::{unit_state, GenerationStatus, StatusId};

/// A row from the `images` table. Rows are never mutated into a new
/// version; regeneration inserts a row with the next version number.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Image {
    pub id: DbId,
    pub chapter_id: DbId,
    pub narration_id: DbId,
    pub scene_number: i32,
    pub shot_number: i32,
    pub version: i32,
    pub storage_key: Option<String>,
    pub status_id: StatusId,
    pub error_message: Option<String>,
    pub deleted_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Image {
    pub fn key(&self) -> ShotKey {
        ShotKey::new(self.scene_number, self.shot_number)
    }

    pub fn state(&self) -> UnitState {
        unit_state::<GenerationStatus>(self.status_id)
    }
}
