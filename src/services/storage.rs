use crate::entities::storage_providers;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use std::time::Duration;
use thiserror::Error;

/// Transport-level failure kinds. Timeout and cancellation are kept
/// distinct from everything else so callers can message them
/// differently (and decide about retrying).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("request timed out")]
    TimedOut,

    #[error("request was cancelled before completion")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StorageError {
    fn from_sdk<E>(err: SdkError<E>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match err {
            SdkError::TimeoutError(_) => StorageError::TimedOut,
            SdkError::DispatchFailure(failure) => {
                if failure.is_timeout() {
                    StorageError::TimedOut
                } else if failure.is_io() {
                    // connection dropped or aborted mid-flight
                    StorageError::Cancelled
                } else {
                    StorageError::Other(anyhow::anyhow!("dispatch failure: {failure:?}"))
                }
            }
            other => StorageError::Other(other.into()),
        }
    }
}

/// A part accepted by the backend, identified by its backend-issued etag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPartInfo {
    pub part_number: i32,
    pub etag: String,
}

/// The storage backend surface the uploaders drive. One implementation
/// per provider protocol; selection happens by provider name through
/// the registry.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Single write of the whole payload.
    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>)
    -> Result<(), StorageError>;

    /// Opens a multipart session; returns the backend session id.
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<String, StorageError>;

    /// Uploads one part; returns its backend identifier (etag).
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Vec<u8>,
    ) -> Result<String, StorageError>;

    /// Finalizes the session; `parts` must be in ascending part order.
    /// The backend is the source of truth for part integrity.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPartInfo>,
    ) -> Result<(), StorageError>;

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError>;

    /// Time-limited private download URL for an object.
    async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError>;
}

pub struct S3ObjectStorage {
    client: Client,
}

impl S3ObjectStorage {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from a provider row (endpoint, region, static
    /// credentials). Path-style addressing for MinIO-compatible
    /// endpoints.
    pub async fn for_provider(provider: &storage_providers::Model) -> Self {
        let aws_config = aws_config::from_env()
            .endpoint_url(&provider.endpoint)
            .region(Region::new(provider.region.clone()))
            .credentials_provider(aws_sdk_s3::config::Credentials::new(
                provider.secret_id.clone(),
                provider.secret_key.clone(),
                None,
                None,
                "static",
            ))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(true)
            .build();

        Self::new(Client::from_conf(s3_config))
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(StorageError::from_sdk)?;
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<String, StorageError> {
        let res = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(StorageError::from_sdk)?;

        res.upload_id()
            .map(|id| id.to_string())
            .ok_or_else(|| StorageError::Other(anyhow::anyhow!("backend returned no upload id")))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Vec<u8>,
    ) -> Result<String, StorageError> {
        let res = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(StorageError::from_sdk)?;

        Ok(res.e_tag().unwrap_or_default().to_string())
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPartInfo>,
    ) -> Result<(), StorageError> {
        let completed_parts: Vec<CompletedPart> = parts
            .into_iter()
            .map(|p| {
                CompletedPart::builder()
                    .e_tag(p.etag)
                    .part_number(p.part_number)
                    .build()
            })
            .collect();

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(StorageError::from_sdk)?;
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(StorageError::from_sdk)?;
        Ok(())
    }

    async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::Other(e.into()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(StorageError::from_sdk)?;

        Ok(presigned.uri().to_string())
    }
}
