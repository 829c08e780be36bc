//! Narration entity model.

use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use storyreel_core::lifecycle::UnitState;
use storyreel_core::narration::NarrationContent;
use storyreel_core::types::{DbId, Timestamp};

use crate::models::status::{unit_state, GenerationStatus, StatusId};

/// A row from the `narrations` table. `content` is set once the
/// structuring call completes.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Narration {
    pub id: DbId,
    pub chapter_id: DbId,
    pub user_id: DbId,
    pub content: Option<Json<NarrationContent>>,
    pub status_id: StatusId,
    pub error_message: Option<String>,
    pub deleted_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Narration {
    pub fn state(&self) -> UnitState {
        unit_state::<GenerationStatus>(self.status_id)
    }

    /// The structured document, if the narration has completed.
    pub fn content(&self) -> Option<&NarrationContent> {
        self.content.as_ref().map(|json| &json.0)
    }
}
