//! Resource ledger: uploaded files tracked as metadata rows pointing
//! into the blob store.
//!
//! A resource starts `pending`, becomes `ready` once its bytes are stored
//! and is immutable from then on. A failed upload leaves a `failed` row
//! so the attempt stays visible.

use std::sync::Arc;

use serde_json::json;
use storyreel_core::naming;
use storyreel_core::types::DbId;
use storyreel_db::models::resource::{CreateResource, Resource};
use storyreel_db::models::status::ResourceStatus;
use storyreel_events::{names, PipelineEvent};
use uuid::Uuid;

use crate::context::PipelineContext;
use crate::error::{PipelineError, PipelineResult};

#[derive(Clone)]
pub struct ResourceLedger {
    ctx: Arc<PipelineContext>,
}

impl ResourceLedger {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Store an uploaded file and record it as a `ready` resource.
    pub async fn register_upload(
        &self,
        user_id: DbId,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> PipelineResult<Resource> {
        if bytes.is_empty() {
            return Err(PipelineError::Validation(format!("Uploaded file '{name}' is empty")));
        }
        let size = bytes.len() as i64;
        let resource = self.create_pending(user_id, name, content_type, size).await?;

        match self
            .ctx
            .blobs
            .upload(&resource.storage_key, bytes, content_type)
            .await
        {
            Ok(_) => self.finish(resource.id, ResourceStatus::Ready, Some(size)).await,
            Err(e) => {
                tracing::warn!(resource_id = resource.id, error = %e, "Resource upload failed");
                self.finish(resource.id, ResourceStatus::Failed, None).await?;
                Err(e.into())
            }
        }
    }

    /// Register a `pending` resource and return a URL the client uploads
    /// to directly. Call [`confirm_upload`](Self::confirm_upload) afterwards.
    pub async fn presign_upload(
        &self,
        user_id: DbId,
        name: &str,
        content_type: &str,
    ) -> PipelineResult<(Resource, String)> {
        let resource = self.create_pending(user_id, name, content_type, 0).await?;
        let url = self
            .ctx
            .blobs
            .presign_upload(&resource.storage_key, self.ctx.config.presign_ttl)
            .await?;
        Ok((resource, url))
    }

    /// Mark a directly uploaded resource `ready` once its object exists.
    pub async fn confirm_upload(&self, resource_id: DbId) -> PipelineResult<Resource> {
        let resource = self.find(resource_id).await?;
        if resource.is_ready() {
            return Ok(resource);
        }
        if !self.ctx.blobs.exists(&resource.storage_key).await? {
            return Err(PipelineError::Validation(format!(
                "Resource {resource_id} has no uploaded object yet"
            )));
        }
        self.finish(resource_id, ResourceStatus::Ready, None).await
    }

    /// Bytes of a `ready` resource.
    pub async fn download(&self, resource_id: DbId) -> PipelineResult<Vec<u8>> {
        let resource = self.find_ready(resource_id).await?;
        Ok(self.ctx.blobs.download(&resource.storage_key).await?)
    }

    pub async fn presign_download(&self, resource_id: DbId) -> PipelineResult<String> {
        let resource = self.find_ready(resource_id).await?;
        Ok(self
            .ctx
            .blobs
            .presign_download(&resource.storage_key, self.ctx.config.presign_ttl)
            .await?)
    }

    /// Tombstone the resource and delete its object. Deleting the object
    /// is idempotent, so a retried delete succeeds.
    pub async fn delete(&self, resource_id: DbId) -> PipelineResult<()> {
        let resource = self.find(resource_id).await?;
        self.ctx.store.soft_delete_resource(resource_id).await?;
        self.ctx.blobs.delete(&resource.storage_key).await?;

        tracing::info!(resource_id, storage_key = %resource.storage_key, "Resource deleted");
        self.ctx.publish(
            PipelineEvent::new(names::RESOURCE_DELETED).with_source("resource", resource_id),
        );
        Ok(())
    }

    pub async fn find(&self, resource_id: DbId) -> PipelineResult<Resource> {
        self.ctx
            .store
            .find_resource(resource_id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "resource",
                id: resource_id,
            })
    }

    pub async fn find_ready(&self, resource_id: DbId) -> PipelineResult<Resource> {
        let resource = self.find(resource_id).await?;
        if !resource.is_ready() {
            return Err(PipelineError::Validation(format!(
                "Resource {resource_id} is not ready"
            )));
        }
        Ok(resource)
    }

    // ---- private helpers ----

    async fn create_pending(
        &self,
        user_id: DbId,
        name: &str,
        content_type: &str,
        file_size: i64,
    ) -> PipelineResult<Resource> {
        let ext = file_extension(name, content_type);
        let token = Uuid::new_v4().simple().to_string();
        let input = CreateResource {
            user_id,
            name: name.to_string(),
            storage_key: naming::resource_key(user_id, &token, &ext),
            ext,
            file_size,
            content_type: content_type.to_string(),
            storage_type: self.ctx.blobs.backend().to_string(),
        };
        Ok(self.ctx.store.create_resource(&input).await?)
    }

    async fn finish(
        &self,
        resource_id: DbId,
        status: ResourceStatus,
        file_size: Option<i64>,
    ) -> PipelineResult<Resource> {
        let resource = self
            .ctx
            .store
            .mark_resource(resource_id, status, file_size)
            .await?;
        let event_type = match status {
            ResourceStatus::Ready => names::RESOURCE_READY,
            _ => names::RESOURCE_FAILED,
        };
        tracing::info!(resource_id, status = status.as_str(), "Resource status updated");
        self.ctx.publish(
            PipelineEvent::new(event_type)
                .with_source("resource", resource_id)
                .with_payload(json!({ "storage_key": resource.storage_key })),
        );
        Ok(resource)
    }
}

/// Extension from the file name, else from the content type.
fn file_extension(name: &str, content_type: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => naming::sanitize_extension(ext),
        _ => naming::extension_for_content_type(content_type).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_prefers_file_name() {
        assert_eq!(file_extension("novel.TXT", "application/octet-stream"), "txt");
        assert_eq!(file_extension("novel", "text/plain"), "txt");
        assert_eq!(file_extension(".hidden", "text/plain"), "txt");
    }
}
