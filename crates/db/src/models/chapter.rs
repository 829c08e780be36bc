//! Chapter entity model.

use serde::Serialize;
use sqlx::FromRow;
use storyreel_core::types::{DbId, Timestamp};

/// A row from the `chapters` table. Text is immutable after creation.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Chapter {
    pub id: DbId,
    pub novel_id: DbId,
    pub user_id: DbId,
    /// 1-based, dense within the novel.
    pub sequence: i32,
    pub title: String,
    pub chapter_text: String,
    pub deleted_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
