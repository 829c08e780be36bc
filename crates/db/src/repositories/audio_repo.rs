//! Repository for the `audios` table.

use sqlx::{PgConnection, PgPool};
use storyreel_core::narration::ShotKey;
use storyreel_core::types::DbId;

use crate::models::audio::Audio;
use crate::models::status::StatusId;

const COLUMNS: &str = "id, narration_id, scene_number, shot_number, storage_key, duration_ms, \
    status_id, error_message, deleted_at, created_at, updated_at";

/// Provides per-shot audio inserts, lookups and status transitions.
pub struct AudioRepo;

impl AudioRepo {
    /// Insert a `pending` audio row for one shot.
    ///
    /// Fails with a unique violation if the shot already has an active row.
    pub async fn insert_pending(
        conn: &mut PgConnection,
        narration_id: DbId,
        key: ShotKey,
    ) -> Result<Audio, sqlx::Error> {
        let query = format!(
            "INSERT INTO audios (narration_id, scene_number, shot_number)
             VALUES ($1, $2, $3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Audio>(&query)
            .bind(narration_id)
            .bind(key.scene_number)
            .bind(key.shot_number)
            .fetch_one(&mut *conn)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Audio>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM audios WHERE id = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, Audio>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a narration's active audio in scene/shot order.
    pub async fn list_by_narration(
        pool: &PgPool,
        narration_id: DbId,
    ) -> Result<Vec<Audio>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM audios
             WHERE narration_id = $1 AND deleted_at IS NULL
             ORDER BY scene_number ASC, shot_number ASC"
        );
        sqlx::query_as::<_, Audio>(&query)
            .bind(narration_id)
            .fetch_all(pool)
            .await
    }

    /// Guarded status update. `storage_key` and `duration_ms` are kept when
    /// `None`; `error_message` is always overwritten.
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        status_id: StatusId,
        allowed: &[StatusId],
        storage_key: Option<&str>,
        duration_ms: Option<i64>,
        error_message: Option<&str>,
    ) -> Result<Option<Audio>, sqlx::Error> {
        let query = format!(
            "UPDATE audios SET
                status_id = $2,
                storage_key = COALESCE($4, storage_key),
                duration_ms = COALESCE($5, duration_ms),
                error_message = $6
             WHERE id = $1 AND deleted_at IS NULL AND status_id = ANY($3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Audio>(&query)
            .bind(id)
            .bind(status_id)
            .bind(allowed)
            .bind(storage_key)
            .bind(duration_ms)
            .bind(error_message)
            .fetch_optional(pool)
            .await
    }
}
