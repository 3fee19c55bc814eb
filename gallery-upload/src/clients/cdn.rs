//! CDN cache invalidation.

use async_trait::async_trait;
use aws_sdk_cloudfront::{
    Client,
    error::DisplayErrorContext,
    types::{InvalidationBatch, Paths},
};

pub type Result<T> = std::result::Result<T, CdnError>;

#[derive(Debug, thiserror::Error)]
pub enum CdnError {
    #[error("Invalid invalidation request: {0}")]
    InvalidRequest(String),

    #[error("Failed to invalidate {paths:?} on distribution {distribution_id}: {message}")]
    Provider {
        distribution_id: String,
        paths: Vec<String>,
        message: String,
    },
}

/// Abstract CDN interface
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    /// Request invalidation of `paths` on `distribution_id`.
    ///
    /// `caller_reference` must be unique per request, the CDN treats a repeated reference as
    /// a replay of the earlier batch. Returns the provider's invalidation id.
    async fn invalidate(&self, distribution_id: &str, paths: &[String], caller_reference: &str) -> Result<String>;
}

/// CloudFront implementation
pub struct CloudFrontInvalidator {
    client: Client,
}

impl CloudFrontInvalidator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(sdk_config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(sdk_config))
    }
}

#[async_trait]
impl CacheInvalidator for CloudFrontInvalidator {
    async fn invalidate(&self, distribution_id: &str, paths: &[String], caller_reference: &str) -> Result<String> {
        let quantity = i32::try_from(paths.len()).map_err(|_| CdnError::InvalidRequest(format!("too many paths ({})", paths.len())))?;

        let batch = InvalidationBatch::builder()
            .caller_reference(caller_reference)
            .paths(
                Paths::builder()
                    .quantity(quantity)
                    .set_items(Some(paths.to_vec()))
                    .build()
                    .map_err(|e| CdnError::InvalidRequest(e.to_string()))?,
            )
            .build()
            .map_err(|e| CdnError::InvalidRequest(e.to_string()))?;

        let output = self
            .client
            .create_invalidation()
            .distribution_id(distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|e| CdnError::Provider {
                distribution_id: distribution_id.to_string(),
                paths: paths.to_vec(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let invalidation_id = output.invalidation().map(|i| i.id().to_string()).unwrap_or_default();
        tracing::info!(distribution_id, %invalidation_id, ?paths, "Requested CDN invalidation");
        Ok(invalidation_id)
    }
}
