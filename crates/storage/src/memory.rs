//! In-process blob store for tests and dry runs.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{validate_key, BlobStore, StorageError, StorageResult};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// Objects held in a map keyed by storage key.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .await
            .get(key)
            .map(|o| o.content_type.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<String> {
        validate_key(key)?;
        self.objects.lock().await.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("memory://{key}"))
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        validate_key(key)?;
        self.objects
            .lock()
            .await
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.objects.lock().await.contains_key(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.objects.lock().await.remove(key);
        Ok(())
    }

    async fn presign_upload(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        validate_key(key)?;
        Ok(format!("memory://{key}?action=upload&ttl={}", ttl.as_secs()))
    }

    async fn presign_download(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        validate_key(key)?;
        Ok(format!("memory://{key}?action=download&ttl={}", ttl.as_secs()))
    }
}
