//! Repository for the `videos` table.

use sqlx::{PgConnection, PgPool};
use storyreel_core::types::DbId;

use crate::models::status::StatusId;
use crate::models::video::Video;

const COLUMNS: &str = "id, chapter_id, user_id, video_type_id, sequence, storage_key, \
    provider_job_id, status_id, error_message, deleted_at, created_at, updated_at";

/// Provides video inserts, lookups and status transitions.
pub struct VideoRepo;

impl VideoRepo {
    /// Tombstone every active video of one type for a chapter.
    pub async fn tombstone_active(
        conn: &mut PgConnection,
        chapter_id: DbId,
        video_type_id: StatusId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE videos SET deleted_at = NOW() \
             WHERE chapter_id = $1 AND video_type_id = $2 AND deleted_at IS NULL",
        )
        .bind(chapter_id)
        .bind(video_type_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Tombstone every active video of a chapter, whatever its type.
    pub async fn tombstone_chapter(
        conn: &mut PgConnection,
        chapter_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE videos SET deleted_at = NOW() WHERE chapter_id = $1 AND deleted_at IS NULL",
        )
        .bind(chapter_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn insert_pending(
        conn: &mut PgConnection,
        chapter_id: DbId,
        user_id: DbId,
        video_type_id: StatusId,
        sequence: i32,
    ) -> Result<Video, sqlx::Error> {
        let query = format!(
            "INSERT INTO videos (chapter_id, user_id, video_type_id, sequence)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Video>(&query)
            .bind(chapter_id)
            .bind(user_id)
            .bind(video_type_id)
            .bind(sequence)
            .fetch_one(&mut *conn)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Video>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM videos WHERE id = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, Video>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List active videos of one type for a chapter in sequence order.
    pub async fn list_active(
        pool: &PgPool,
        chapter_id: DbId,
        video_type_id: StatusId,
    ) -> Result<Vec<Video>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM videos
             WHERE chapter_id = $1 AND video_type_id = $2 AND deleted_at IS NULL
             ORDER BY sequence ASC"
        );
        sqlx::query_as::<_, Video>(&query)
            .bind(chapter_id)
            .bind(video_type_id)
            .fetch_all(pool)
            .await
    }

    /// Guarded status update. `storage_key` and `provider_job_id` are kept
    /// when `None`; `error_message` is always overwritten.
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        status_id: StatusId,
        allowed: &[StatusId],
        storage_key: Option<&str>,
        provider_job_id: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<Option<Video>, sqlx::Error> {
        let query = format!(
            "UPDATE videos SET
                status_id = $2,
                storage_key = COALESCE($4, storage_key),
                provider_job_id = COALESCE($5, provider_job_id),
                error_message = $6
             WHERE id = $1 AND deleted_at IS NULL AND status_id = ANY($3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Video>(&query)
            .bind(id)
            .bind(status_id)
            .bind(allowed)
            .bind(storage_key)
            .bind(provider_job_id)
            .bind(error_message)
            .fetch_optional(pool)
            .await
    }
}
