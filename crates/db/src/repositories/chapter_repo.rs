//! Repository for the `chapters` table.

use sqlx::{PgConnection, PgPool};
use storyreel_core::types::DbId;

use crate::models::chapter::Chapter;

const COLUMNS: &str = "id, novel_id, user_id, sequence, title, chapter_text, \
    deleted_at, created_at, updated_at";

/// Provides chapter inserts and lookups.
pub struct ChapterRepo;

impl ChapterRepo {
    /// Lock an active novel row for the rest of the transaction.
    ///
    /// Returns `None` if the novel does not exist or is soft-deleted.
    pub async fn lock_novel(
        conn: &mut PgConnection,
        novel_id: DbId,
    ) -> Result<Option<DbId>, sqlx::Error> {
        let row: Option<(DbId,)> =
            sqlx::query_as("SELECT id FROM novels WHERE id = $1 AND deleted_at IS NULL FOR UPDATE")
                .bind(novel_id)
                .fetch_optional(&mut *conn)
                .await?;
        Ok(row.map(|r| r.0))
    }

    /// Count active chapters of a novel.
    pub async fn count_active(conn: &mut PgConnection, novel_id: DbId) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM chapters WHERE novel_id = $1 AND deleted_at IS NULL",
        )
        .bind(novel_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(row.0)
    }

    /// Insert a single chapter.
    pub async fn insert(
        conn: &mut PgConnection,
        novel_id: DbId,
        user_id: DbId,
        sequence: i32,
        title: &str,
        chapter_text: &str,
    ) -> Result<Chapter, sqlx::Error> {
        let query = format!(
            "INSERT INTO chapters (novel_id, user_id, sequence, title, chapter_text)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Chapter>(&query)
            .bind(novel_id)
            .bind(user_id)
            .bind(sequence)
            .bind(title)
            .bind(chapter_text)
            .fetch_one(&mut *conn)
            .await
    }

    /// Find a chapter by ID. Excludes soft-deleted rows.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Chapter>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM chapters WHERE id = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, Chapter>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a novel's active chapters in sequence order.
    pub async fn list_by_novel(pool: &PgPool, novel_id: DbId) -> Result<Vec<Chapter>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM chapters
             WHERE novel_id = $1 AND deleted_at IS NULL
             ORDER BY sequence ASC"
        );
        sqlx::query_as::<_, Chapter>(&query)
            .bind(novel_id)
            .fetch_all(pool)
            .await
    }
}
