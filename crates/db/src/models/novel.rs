//! Novel entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use storyreel_core::types::{DbId, Timestamp};

/// A row from the `novels` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Novel {
    pub id: DbId,
    pub resource_id: DbId,
    pub user_id: DbId,
    /// Free-form style hint passed to the structuring provider.
    pub style: Option<String>,
    /// Narration perspective hint (e.g. first person, narrator).
    pub narration_type: Option<String>,
    pub deleted_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a novel from a ready resource.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNovel {
    pub resource_id: DbId,
    pub user_id: DbId,
    pub style: Option<String>,
    pub narration_type: Option<String>,
}
