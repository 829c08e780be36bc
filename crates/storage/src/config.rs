//! Blob store selection from the environment.

use std::path::PathBuf;
use std::sync::Arc;

use crate::{BlobStore, LocalBlobStore, S3BlobStore, StorageError, StorageResult};

/// Default filesystem root for the local backend.
const DEFAULT_LOCAL_ROOT: &str = "./data/blobs";

/// Default base URL under which local objects are served.
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000/files";

/// Default region when `S3_REGION` is not set.
const DEFAULT_S3_REGION: &str = "us-east-1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    S3,
}

/// Storage configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory of the local backend.
    pub local_root: PathBuf,
    /// Base URL under which the local backend's objects are served.
    pub public_base_url: String,
    pub s3_bucket: Option<String>,
    pub s3_region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, R2).
    pub s3_endpoint: Option<String>,
}

impl StorageConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                   | Default                       |
    /// |---------------------------|-------------------------------|
    /// | `STORAGE_BACKEND`         | `local` (`local` or `s3`)     |
    /// | `STORAGE_LOCAL_ROOT`      | `./data/blobs`                |
    /// | `STORAGE_PUBLIC_BASE_URL` | `http://localhost:3000/files` |
    /// | `S3_BUCKET`               | required when backend is `s3` |
    /// | `S3_REGION`               | `us-east-1`                   |
    /// | `S3_ENDPOINT`             | AWS default                   |
    pub fn from_env() -> StorageResult<Self> {
        let backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".into())
            .to_ascii_lowercase()
            .as_str()
        {
            "local" => StorageBackend::Local,
            "s3" => StorageBackend::S3,
            other => {
                return Err(StorageError::Config(format!(
                    "STORAGE_BACKEND must be 'local' or 's3', got '{other}'"
                )))
            }
        };

        let config = Self {
            backend,
            local_root: std::env::var("STORAGE_LOCAL_ROOT")
                .unwrap_or_else(|_| DEFAULT_LOCAL_ROOT.into())
                .into(),
            public_base_url: std::env::var("STORAGE_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_PUBLIC_BASE_URL.into()),
            s3_bucket: std::env::var("S3_BUCKET").ok().filter(|b| !b.is_empty()),
            s3_region: std::env::var("S3_REGION").unwrap_or_else(|_| DEFAULT_S3_REGION.into()),
            s3_endpoint: std::env::var("S3_ENDPOINT").ok().filter(|e| !e.is_empty()),
        };

        if config.backend == StorageBackend::S3 && config.s3_bucket.is_none() {
            return Err(StorageError::Config(
                "S3_BUCKET is required when STORAGE_BACKEND=s3".into(),
            ));
        }
        Ok(config)
    }

    /// Construct the configured backend.
    pub async fn build(&self) -> StorageResult<Arc<dyn BlobStore>> {
        match self.backend {
            StorageBackend::Local => Ok(Arc::new(LocalBlobStore::new(
                &self.local_root,
                &self.public_base_url,
            )?)),
            StorageBackend::S3 => {
                let bucket = self
                    .s3_bucket
                    .clone()
                    .ok_or_else(|| StorageError::Config("S3_BUCKET is not set".into()))?;
                let store =
                    S3BlobStore::connect(bucket, &self.s3_region, self.s3_endpoint.as_deref())
                        .await;
                Ok(Arc::new(store))
            }
        }
    }
}
