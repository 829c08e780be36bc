//! Filesystem blob store behaviour against a temporary directory.

use std::time::Duration;

use assert_matches::assert_matches;
use storyreel_storage::{BlobStore, LocalBlobStore, StorageError};

fn store() -> (tempfile::TempDir, LocalBlobStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalBlobStore::new(dir.path(), "http://localhost:3000/files/").unwrap();
    (dir, store)
}

#[tokio::test]
async fn upload_then_download_nested_key() {
    let (dir, store) = store();

    let url = store
        .upload("audio/7/s001_shot002.mp3", b"ID3".to_vec(), "audio/mpeg")
        .await
        .unwrap();

    assert_eq!(url, "http://localhost:3000/files/audio/7/s001_shot002.mp3");
    assert!(dir.path().join("audio/7/s001_shot002.mp3").is_file());
    assert_eq!(
        store.download("audio/7/s001_shot002.mp3").await.unwrap(),
        b"ID3"
    );
}

#[tokio::test]
async fn upload_replaces_existing_object() {
    let (_dir, store) = store();
    store.upload("a/b.txt", b"one".to_vec(), "text/plain").await.unwrap();
    store.upload("a/b.txt", b"two".to_vec(), "text/plain").await.unwrap();
    assert_eq!(store.download("a/b.txt").await.unwrap(), b"two");
    assert!(!store.exists("a/b.txt.part").await.unwrap());
}

#[tokio::test]
async fn missing_key_is_not_found() {
    let (_dir, store) = store();
    assert_matches!(
        store.download("nope/missing.png").await,
        Err(StorageError::NotFound(key)) if key == "nope/missing.png"
    );
    assert!(!store.exists("nope/missing.png").await.unwrap());
}

#[tokio::test]
async fn delete_is_idempotent() {
    let (_dir, store) = store();
    store.upload("x/y.bin", vec![1, 2, 3], "application/octet-stream").await.unwrap();

    store.delete("x/y.bin").await.unwrap();
    store.delete("x/y.bin").await.unwrap();
    assert!(!store.exists("x/y.bin").await.unwrap());
}

#[tokio::test]
async fn escaping_keys_are_rejected() {
    let (_dir, store) = store();
    assert_matches!(
        store.upload("../outside.txt", vec![], "text/plain").await,
        Err(StorageError::InvalidKey(_))
    );
    assert_matches!(
        store.download("/etc/hosts").await,
        Err(StorageError::InvalidKey(_))
    );
}

#[tokio::test]
async fn presigned_urls_are_server_mediated() {
    let (_dir, store) = store();
    let url = store
        .presign_download("videos/3/final_9.mp4", Duration::from_secs(60))
        .await
        .unwrap();
    assert!(url.starts_with("http://localhost:3000/files/videos/3/final_9.mp4?action=download&expires="));

    let expires: i64 = url.rsplit('=').next().unwrap().parse().unwrap();
    let now = chrono::Utc::now().timestamp();
    assert!(expires > now && expires <= now + 61);
}
