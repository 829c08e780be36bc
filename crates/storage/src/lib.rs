//! Binary object storage for pipeline artifacts.
//!
//! Every stage stores its output (source text, audio clips, caption
//! tracks, images, videos) through the [`BlobStore`] contract. Metadata
//! lives in the database; this crate only moves bytes. Three backends
//! exist: [`LocalBlobStore`] on the filesystem, [`S3BlobStore`] on any
//! S3-compatible object store, and [`MemoryBlobStore`] for tests.

use std::time::Duration;

use async_trait::async_trait;

pub mod config;
pub mod local;
pub mod memory;
pub mod s3;

pub use config::{StorageBackend, StorageConfig};
pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

/// Longest accepted storage key, matching the S3 object key limit.
pub const MAX_KEY_LEN: usize = 1024;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The key is empty, absolute, or escapes the store root.
    #[error("Invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    /// Network failures, throttling and 5xx responses.
    #[error("Transient storage failure: {0}")]
    Transient(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether the caller may retry the same operation unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Uniform upload/download/presign/delete contract over a storage backend.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Backend name recorded on resources (`storage_type` column).
    fn backend(&self) -> &'static str;

    /// Store `bytes` under `key`, replacing any existing object, and
    /// return a retrievable locator.
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<String>;

    /// Fetch an object. Fails with [`StorageError::NotFound`] if absent.
    async fn download(&self, key: &str) -> StorageResult<Vec<u8>>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Remove an object. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Time-bounded URL a client may upload to directly.
    async fn presign_upload(&self, key: &str, ttl: Duration) -> StorageResult<String>;

    /// Time-bounded URL a client may download from directly.
    async fn presign_download(&self, key: &str, ttl: Duration) -> StorageResult<String>;
}

/// Reject keys that are empty, absolute, contain `.`/`..` or empty
/// segments, backslashes or control characters.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let invalid = || StorageError::InvalidKey(key.to_string());

    if key.is_empty() || key.len() > MAX_KEY_LEN || key.starts_with('/') {
        return Err(invalid());
    }
    if key.contains('\\') || key.chars().any(char::is_control) {
        return Err(invalid());
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn accepts_nested_keys() {
        assert!(validate_key("audio/12/s001_shot002.mp3").is_ok());
        assert!(validate_key("resources/1/abc.txt").is_ok());
    }

    #[test]
    fn rejects_escaping_keys() {
        for key in ["", "/etc/passwd", "a/../b", "a//b", "./a", "a\\b", "a/\n"] {
            assert_matches!(validate_key(key), Err(StorageError::InvalidKey(_)), "{key:?}");
        }
    }

    #[test]
    fn transient_classification() {
        assert!(StorageError::Transient("503".into()).is_transient());
        assert!(StorageError::Io(std::io::ErrorKind::TimedOut.into()).is_transient());
        assert!(!StorageError::NotFound("k".into()).is_transient());
        assert!(!StorageError::InvalidKey("..".into()).is_transient());
    }
}
