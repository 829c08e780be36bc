//! Repository for the `narrations` table.

use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use storyreel_core::narration::NarrationContent;
use storyreel_core::types::DbId;

use crate::models::narration::Narration;
use crate::models::status::StatusId;

const COLUMNS: &str = "id, chapter_id, user_id, content, status_id, error_message, \
    deleted_at, created_at, updated_at";

/// Provides narration inserts, lookups and status transitions.
pub struct NarrationRepo;

impl NarrationRepo {
    /// Tombstone the active narration of a chapter, if any.
    pub async fn tombstone_active(
        conn: &mut PgConnection,
        chapter_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE narrations SET deleted_at = NOW() \
             WHERE chapter_id = $1 AND deleted_at IS NULL",
        )
        .bind(chapter_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Insert a new `pending` narration with no content.
    pub async fn insert_pending(
        conn: &mut PgConnection,
        chapter_id: DbId,
        user_id: DbId,
    ) -> Result<Narration, sqlx::Error> {
        let query = format!(
            "INSERT INTO narrations (chapter_id, user_id) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Narration>(&query)
            .bind(chapter_id)
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await
    }

    /// Find a narration by ID. Excludes soft-deleted rows.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Narration>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM narrations WHERE id = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, Narration>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find the single active narration of a chapter.
    pub async fn find_active_by_chapter(
        pool: &PgPool,
        chapter_id: DbId,
    ) -> Result<Option<Narration>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM narrations WHERE chapter_id = $1 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, Narration>(&query)
            .bind(chapter_id)
            .fetch_optional(pool)
            .await
    }

    /// Guarded status update. `content` is kept when `None`;
    /// `error_message` is always overwritten.
    ///
    /// Returns `None` when the row is missing or not in an allowed status.
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        status_id: StatusId,
        allowed: &[StatusId],
        content: Option<&NarrationContent>,
        error_message: Option<&str>,
    ) -> Result<Option<Narration>, sqlx::Error> {
        let query = format!(
            "UPDATE narrations SET
                status_id = $2,
                content = COALESCE($4, content),
                error_message = $5
             WHERE id = $1 AND deleted_at IS NULL AND status_id = ANY($3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Narration>(&query)
            .bind(id)
            .bind(status_id)
            .bind(allowed)
            .bind(content.map(Json))
            .bind(error_message)
            .fetch_optional(pool)
            .await
    }
}
