//! Repository for the `novels` table.

use sqlx::PgPool;
use storyreel_core::types::DbId;

use crate::models::novel::{CreateNovel, Novel};

const COLUMNS: &str =
    "id, resource_id, user_id, style, narration_type, deleted_at, created_at, updated_at";

/// Provides CRUD operations for novels.
pub struct NovelRepo;

impl NovelRepo {
    pub async fn create(pool: &PgPool, input: &CreateNovel) -> Result<Novel, sqlx::Error> {
        let query = format!(
            "INSERT INTO novels (resource_id, user_id, style, narration_type)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Novel>(&query)
            .bind(input.resource_id)
            .bind(input.user_id)
            .bind(input.style.as_deref())
            .bind(input.narration_type.as_deref())
            .fetch_one(pool)
            .await
    }

    /// Find a novel by ID. Excludes soft-deleted rows.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Novel>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM novels WHERE id = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, Novel>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
