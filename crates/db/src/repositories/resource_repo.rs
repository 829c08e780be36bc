//! Repository for the `resources` table.

use sqlx::PgPool;
use storyreel_core::types::DbId;

use crate::models::resource::{CreateResource, Resource};
use crate::models::status::StatusId;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, name, ext, file_size, content_type, storage_key, \
    storage_type, status_id, deleted_at, created_at, updated_at";

/// Provides CRUD operations for uploaded resources.
pub struct ResourceRepo;

impl ResourceRepo {
    /// Insert a new resource in `pending` status.
    pub async fn create(pool: &PgPool, input: &CreateResource) -> Result<Resource, sqlx::Error> {
        let query = format!(
            "INSERT INTO resources
                (user_id, name, ext, file_size, content_type, storage_key, storage_type)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Resource>(&query)
            .bind(input.user_id)
            .bind(&input.name)
            .bind(&input.ext)
            .bind(input.file_size)
            .bind(&input.content_type)
            .bind(&input.storage_key)
            .bind(&input.storage_type)
            .fetch_one(pool)
            .await
    }

    /// Find a resource by ID. Excludes soft-deleted rows.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Resource>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM resources WHERE id = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, Resource>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Move a resource to `status_id` if it is currently in one of `allowed`.
    ///
    /// Returns `None` when the row is missing or not in an allowed status.
    pub async fn update_status(
        pool: &PgPool,
        id: DbId,
        status_id: StatusId,
        allowed: &[StatusId],
        file_size: Option<i64>,
    ) -> Result<Option<Resource>, sqlx::Error> {
        let query = format!(
            "UPDATE resources SET
                status_id = $2,
                file_size = COALESCE($4, file_size)
             WHERE id = $1 AND deleted_at IS NULL AND status_id = ANY($3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Resource>(&query)
            .bind(id)
            .bind(status_id)
            .bind(allowed)
            .bind(file_size)
            .fetch_optional(pool)
            .await
    }

    /// Soft-delete a resource. Returns `true` if a row was marked deleted.
    pub async fn soft_delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE resources SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
