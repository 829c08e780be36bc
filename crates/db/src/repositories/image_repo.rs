//! Repository for the `images` table.
//!
//! Version numbers are assigned per `(chapter_id, scene_number,
//! shot_number)` inside a transaction that holds the chapter row lock, so
//! concurrent batches for the same chapter serialize instead of racing on
//! `MAX(version) + 1`.

use sqlx::{PgConnection, PgPool};
use storyreel_core::narration::ShotKey;
use storyreel_core::types::DbId;

use crate::models::image::Image;
use crate::models::status::StatusId;

const COLUMNS: &str = "id, chapter_id, narration_id, scene_number, shot_number, version, \
    storage_key, status_id, error_message, deleted_at, created_at, updated_at";

/// Provides versioned image inserts, lookups and status transitions.
pub struct ImageRepo;

impl ImageRepo {
    /// Lock an active chapter row for the rest of the transaction.
    pub async fn lock_chapter(
        conn: &mut PgConnection,
        chapter_id: DbId,
    ) -> Result<Option<DbId>, sqlx::Error> {
        let row: Option<(DbId,)> = sqlx::query_as(
            "SELECT id FROM chapters WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(chapter_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row.map(|r| r.0))
    }

    /// Insert a `pending` image with the next version number for its key.
    ///
    /// Tombstoned rows count towards the maximum so a version number is
    /// never reused.
    pub async fn insert_next_version(
        conn: &mut PgConnection,
        chapter_id: DbId,
        narration_id: DbId,
        key: ShotKey,
    ) -> Result<Image, sqlx::Error> {
        let query = format!(
            "INSERT INTO images (chapter_id, narration_id, scene_number, shot_number, version)
             VALUES (
                $1, $2, $3, $4,
                (SELECT COALESCE(MAX(version), 0) + 1 FROM images
                 WHERE chapter_id = $1 AND scene_number = $3 AND shot_number = $4)
             )
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Image>(&query)
            .bind(chapter_id)
            .bind(narration_id)
            .bind(key.scene_number)
            .bind(key.shot_number)
            .fetch_one(&mut *conn)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Image>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM images WHERE id = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, Image>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List every active image version of a chapter, ordered by shot then
    /// version.
    pub async fn list_by_chapter(
        pool: &PgPool,
        chapter_id: DbId,
    ) -> Result<Vec<Image>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM images
             WHERE chapter_id = $1 AND deleted_at IS NULL
             ORDER BY scene_number ASC, shot_number ASC, version ASC"
        );
        sqlx::query_as::<_, Image>(&query)
            .bind(chapter_id)
            .fetch_all(pool)
            .await
    }

    /// Guarded status update.
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        status_id: StatusId,
        allowed: &[StatusId],
        storage_key: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<Option<Image>, sqlx::Error> {
        let query = format!(
            "UPDATE images SET
                status_id = $2,
                storage_key = COALESCE($4, storage_key),
                error_message = $5
             WHERE id = $1 AND deleted_at IS NULL AND status_id = ANY($3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Image>(&query)
            .bind(id)
            .bind(status_id)
            .bind(allowed)
            .bind(storage_key)
            .bind(error_message)
            .fetch_optional(pool)
            .await
    }
}
