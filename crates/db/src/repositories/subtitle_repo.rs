//! Repository for the `subtitles` table.

use sqlx::{PgConnection, PgPool};
use storyreel_core::types::DbId;

use crate::models::status::StatusId;
use crate::models::subtitle::Subtitle;

const COLUMNS: &str = "id, narration_id, storage_key, cue_count, status_id, error_message, \
    deleted_at, created_at, updated_at";

/// Provides subtitle inserts, lookups and status transitions.
pub struct SubtitleRepo;

impl SubtitleRepo {
    /// Tombstone the active subtitle of a narration, if any.
    pub async fn tombstone_active(
        conn: &mut PgConnection,
        narration_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE subtitles SET deleted_at = NOW() \
             WHERE narration_id = $1 AND deleted_at IS NULL",
        )
        .bind(narration_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn insert_pending(
        conn: &mut PgConnection,
        narration_id: DbId,
    ) -> Result<Subtitle, sqlx::Error> {
        let query =
            format!("INSERT INTO subtitles (narration_id) VALUES ($1) RETURNING {COLUMNS}");
        sqlx::query_as::<_, Subtitle>(&query)
            .bind(narration_id)
            .fetch_one(&mut *conn)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Subtitle>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM subtitles WHERE id = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, Subtitle>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_active_by_narration(
        pool: &PgPool,
        narration_id: DbId,
    ) -> Result<Option<Subtitle>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM subtitles WHERE narration_id = $1 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, Subtitle>(&query)
            .bind(narration_id)
            .fetch_optional(pool)
            .await
    }

    /// Guarded status update.
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        status_id: StatusId,
        allowed: &[StatusId],
        storage_key: Option<&str>,
        cue_count: Option<i32>,
        error_message: Option<&str>,
    ) -> Result<Option<Subtitle>, sqlx::Error> {
        let query = format!(
            "UPDATE subtitles SET
                status_id = $2,
                storage_key = COALESCE($4, storage_key),
                cue_count = COALESCE($5, cue_count),
                error_message = $6
             WHERE id = $1 AND deleted_at IS NULL AND status_id = ANY($3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Subtitle>(&query)
            .bind(id)
            .bind(status_id)
            .bind(allowed)
            .bind(storage_key)
            .bind(cue_count)
            .bind(error_message)
            .fetch_optional(pool)
            .await
    }
}
