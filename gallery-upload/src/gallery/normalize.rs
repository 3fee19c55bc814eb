//! Format normalization: camera-native uploads are re-encoded as JPEG, web formats pass through.

use bytes::Bytes;
use image::ImageFormat;
use std::sync::Arc;

use crate::clients::codec::ImageCodec;
use crate::config::ImageConfig;
use crate::errors::{Error, Result};

const DISPLAY_EXTENSION: &str = "jpg";
const DISPLAY_CONTENT_TYPE: &str = "image/jpeg";

/// Image data ready to be stored
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub data: Bytes,
    pub extension: String,
    pub content_type: String,
    /// Whether the payload was re-encoded
    pub converted: bool,
}

#[derive(Clone)]
pub struct FormatNormalizer {
    config: ImageConfig,
    codec: Arc<dyn ImageCodec>,
}

impl FormatNormalizer {
    pub fn new(config: ImageConfig, codec: Arc<dyn ImageCodec>) -> Self {
        Self { config, codec }
    }

    /// Reject extensions outside the allow-list. Runs before anything is decoded or stored.
    pub fn check_extension(&self, extension: &str) -> Result<()> {
        if self.config.allowed_extensions.iter().any(|allowed| allowed == extension) {
            return Ok(());
        }
        Err(Error::Validation {
            message: format!(
                "Unsupported file type {extension:?}. Only {} files are supported.",
                self.config
                    .allowed_extensions
                    .iter()
                    .map(|ext| ext.to_uppercase())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })
    }

    pub fn is_camera_native(&self, extension: &str) -> bool {
        self.config.camera_native_extensions.iter().any(|native| native == extension)
    }

    /// Content type for a pass-through upload
    pub fn content_type(&self, extension: &str) -> &str {
        self.config
            .content_types
            .get(extension)
            .map(String::as_str)
            .unwrap_or(self.config.default_content_type.as_str())
    }

    /// Normalize `data` uploaded with the lowercase `extension`.
    ///
    /// Decoding and encoding run on the blocking pool.
    pub async fn normalize(&self, data: Bytes, extension: &str) -> Result<NormalizedImage> {
        self.check_extension(extension)?;

        if !self.is_camera_native(extension) {
            return Ok(NormalizedImage {
                data,
                extension: extension.to_string(),
                content_type: self.content_type(extension).to_string(),
                converted: false,
            });
        }

        let codec = self.codec.clone();
        let quality = self.config.jpeg_quality;
        let source_size = data.len();
        tracing::info!(extension, source_size, quality, "Converting camera-native image to JPEG");

        let jpeg = tokio::task::spawn_blocking(move || {
            let image = codec.decode(&data)?;
            codec.encode(&image, ImageFormat::Jpeg, quality)
        })
        .await
        .map_err(|e| Error::Internal {
            operation: format!("join image conversion task: {e}"),
        })??;

        tracing::debug!(source_size, converted_size = jpeg.len(), "Converted image");

        Ok(NormalizedImage {
            data: Bytes::from(jpeg),
            extension: DISPLAY_EXTENSION.to_string(),
            content_type: DISPLAY_CONTENT_TYPE.to_string(),
            converted: true,
        })
    }
}
