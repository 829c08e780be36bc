//! Subtitle entity model.

use serde::Serialize;
use sqlx::FromRow;
use storyreel_core::lifecycle::UnitState;
use storyreel_core::types::{DbId, Timestamp};

use crate::models::status::{unit_state, GenerationStatus, StatusId};

/// A row from the `subtitles` table: the aggregate caption track of a
/// narration.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Subtitle {
    pub id: DbId,
    pub narration_id: DbId,
    pub storage_key: Option<String>,
    pub cue_count: Option<i32>,
    pub status_id: StatusId,
    pub error_message: Option<String>,
    pub deleted_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subtitle {
    pub fn state(&self) -> UnitState {
        unit_state::<GenerationStatus>(self.status_id)
    }
}
