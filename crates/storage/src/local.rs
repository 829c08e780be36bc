//! Filesystem blob store.
//!
//! Objects live at `{root}/{key}`. Writes go to a temporary sibling file
//! and are renamed into place, so readers never observe a partial object.
//! The filesystem cannot sign URLs, so presigned URLs are server-mediated
//! links under the public base URL carrying an expiry timestamp.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::{validate_key, BlobStore, StorageError, StorageResult};

pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    /// Create the store, creating `root` if it does not exist.
    pub fn new(root: impl AsRef<Path>, public_base_url: &str) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        tracing::info!(path = %root.display(), "Local blob store ready");
        Ok(Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    fn signed_url(&self, key: &str, ttl: Duration, action: &str) -> String {
        let expires = chrono::Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        format!(
            "{}?action={action}&expires={}",
            self.url_for(key),
            expires.timestamp()
        )
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut temp_name = path.clone().into_os_string();
        temp_name.push(".part");
        let temp_path = PathBuf::from(temp_name);
        let size = bytes.len();
        tokio::fs::write(&temp_path, bytes).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        tracing::debug!(key, size, content_type, "Stored local object");
        Ok(self.url_for(key))
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(key, "Deleted local object");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn presign_upload(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        validate_key(key)?;
        Ok(self.signed_url(key, ttl, "upload"))
    }

    async fn presign_download(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        validate_key(key)?;
        Ok(self.signed_url(key, ttl, "download"))
    }
}
