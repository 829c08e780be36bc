//! S3-compatible blob store backed by `aws-sdk-s3`.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use crate::{validate_key, BlobStore, StorageError, StorageResult};

#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    /// Build a client from the default credential chain.
    ///
    /// A custom `endpoint` switches to path-style addressing, which
    /// MinIO and most S3-compatible stores require.
    pub async fn connect(bucket: String, region: &str, endpoint: Option<&str>) -> Self {
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        tracing::info!(bucket = %bucket, region, endpoint = ?endpoint, "S3 blob store ready");
        Self {
            client: Client::from_conf(builder.build()),
            bucket,
        }
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    fn presigning(ttl: Duration) -> StorageResult<PresigningConfig> {
        PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::Backend(format!("Invalid presign TTL: {e}")))
    }
}

/// Map an SDK failure onto the storage taxonomy. Timeouts, dispatch
/// failures, 429 and 5xx responses are transient.
fn classify<E>(op: &str, key: &str, err: SdkError<E, HttpResponse>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let message = format!("{op} {key}: {}", DisplayErrorContext(&err));

    let transient = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => true,
        SdkError::ResponseError(_) => true,
        _ => matches!(status, Some(429) | Some(500..=599)),
    };

    if transient {
        StorageError::Transient(message)
    } else if status == Some(404) {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Backend(message)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn backend(&self) -> &'static str {
        "s3"
    }

    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<String> {
        validate_key(key)?;
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| classify("put_object", key, e))?;

        tracing::debug!(bucket = %self.bucket, key, size, "Stored S3 object");
        Ok(self.object_url(key))
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        validate_key(key)?;
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound(key.to_string())
                } else {
                    classify("get_object", key, e)
                }
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Transient(format!("Reading {key}: {e}")))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => match classify("head_object", key, e) {
                StorageError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        // DeleteObject succeeds for absent keys.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify("delete_object", key, e))?;
        tracing::debug!(bucket = %self.bucket, key, "Deleted S3 object");
        Ok(())
    }

    async fn presign_upload(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        validate_key(key)?;
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(Self::presigning(ttl)?)
            .await
            .map_err(|e| classify("presign put_object", key, e))?;
        Ok(request.uri().to_string())
    }

    async fn presign_download(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        validate_key(key)?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(Self::presigning(ttl)?)
            .await
            .map_err(|e| classify("presign get_object", key, e))?;
        Ok(request.uri().to_string())
    }
}
