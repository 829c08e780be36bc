//! Resource entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use storyreel_core::lifecycle::Lifecycle;
use storyreel_core::types::{DbId, Timestamp};

use crate::models::status::{ResourceStatus, StatusId};

/// A row from the `resources` table: an uploaded file tracked in the
/// object store.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Resource {
    pub id: DbId,
    pub user_id: DbId,
    pub name: String,
    pub ext: String,
    pub file_size: i64,
    pub content_type: String,
    pub storage_key: String,
    pub storage_type: String,
    pub status_id: StatusId,
    pub deleted_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Resource {
    pub fn status(&self) -> Option<ResourceStatus> {
        ResourceStatus::from_id(self.status_id)
    }

    pub fn is_ready(&self) -> bool {
        self.status() == Some(ResourceStatus::Ready)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_deleted_at(self.deleted_at)
    }
}

/// DTO for registering a new resource. Rows start as `pending`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateResource {
    pub user_id: DbId,
    pub name: String,
    pub ext: String,
    pub file_size: i64,
    pub content_type: String,
    pub storage_key: String,
    pub storage_type: String,
}
