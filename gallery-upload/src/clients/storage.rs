//! Object storage for uploaded images and the gallery page.

use async_trait::async_trait;
use aws_sdk_s3::{Client, error::DisplayErrorContext, primitives::ByteStream};
use bytes::Bytes;

use crate::config::StorageConfig;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object {key} not found")]
    NotFound { key: String },

    /// A conditional write found the object changed since it was read
    #[error("Object {key} was modified concurrently")]
    PreconditionFailed { key: String },

    #[error("Failed to {operation} {key}: {message}")]
    Backend { operation: &'static str, key: String, message: String },
}

/// An object body together with its entity tag.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub e_tag: Option<String>,
}

/// Trait for object storage backends, scoped to a single bucket
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key`, replacing any existing object
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()>;

    /// Fetch the object stored under `key`
    async fn get(&self, key: &str) -> Result<StoredObject>;

    /// Store `body` under `key` only if the current object still carries `e_tag`
    async fn put_if_match(&self, key: &str, body: Bytes, content_type: &str, e_tag: &str) -> Result<()>;
}

/// S3 storage backend
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from the shared AWS config, applying endpoint overrides for S3-compatible stores
    pub fn from_config(sdk_config: &aws_config::SdkConfig, config: &StorageConfig) -> Self {
        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config).force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint.as_str().trim_end_matches('/'));
        }
        Self::new(Client::from_conf(builder.build()), config.bucket.clone())
    }

    async fn put_object(&self, key: &str, body: Bytes, content_type: &str, e_tag: Option<&str>) -> Result<()> {
        let size = body.len();
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .set_if_match(e_tag.map(str::to_string))
            .send()
            .await;

        match result {
            Ok(_) => {
                tracing::debug!(bucket = %self.bucket, key, size, content_type, "Stored object");
                Ok(())
            }
            // 412 when the ETag no longer matches, 409 when another conditional write is in flight
            Err(e) if matches!(e.raw_response().map(|r| r.status().as_u16()), Some(409 | 412)) => {
                Err(StorageError::PreconditionFailed { key: key.to_string() })
            }
            Err(e) => Err(StorageError::Backend {
                operation: "put",
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            }),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        self.put_object(key, body, content_type, None).await
    }

    async fn get(&self, key: &str) -> Result<StoredObject> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service_error) if service_error.is_no_such_key() => StorageError::NotFound { key: key.to_string() },
                _ => StorageError::Backend {
                    operation: "get",
                    key: key.to_string(),
                    message: DisplayErrorContext(&e).to_string(),
                },
            })?;

        let e_tag = output.e_tag().map(str::to_string);
        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend {
                operation: "read",
                key: key.to_string(),
                message: e.to_string(),
            })?
            .into_bytes();

        tracing::debug!(bucket = %self.bucket, key, size = body.len(), "Fetched object");
        Ok(StoredObject { body, e_tag })
    }

    async fn put_if_match(&self, key: &str, body: Bytes, content_type: &str, e_tag: &str) -> Result<()> {
        self.put_object(key, body, content_type, Some(e_tag)).await
    }
}
