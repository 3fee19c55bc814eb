use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::{Error, Result};
use crate::gallery::{Upload, UploadReceipt};

pub const UPLOAD_SUCCESS_MESSAGE: &str = "Image uploaded successfully";

/// Upload request body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    /// Image bytes, base64 encoded. A `data:<mime>;base64,` prefix is accepted.
    pub file: String,
    /// Original file name; its extension selects the image format
    #[schema(example = "IMG_0042.jpg")]
    pub file_name: String,
    /// Gallery folder the image belongs to
    #[schema(example = "2025-06")]
    pub gallery_folder: String,
}

impl UploadRequest {
    /// Decode the base64 payload.
    pub fn into_upload(self) -> Result<Upload> {
        let encoded = match self.file.split_once(";base64,") {
            Some((prefix, data)) if prefix.starts_with("data:") => data,
            _ => self.file.as_str(),
        };
        // Wrapped base64 (MIME style) is accepted
        let encoded: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();

        let data = STANDARD.decode(encoded).map_err(|e| Error::BadRequest {
            message: format!("file is not valid base64: {e}"),
        })?;

        Ok(Upload {
            data: Bytes::from(data),
            file_name: self.file_name,
            gallery_folder: self.gallery_folder,
        })
    }
}

/// Successful upload
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    /// Public URL of the stored image
    pub image_url: String,
    /// Gallery page updates that could not be applied
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl From<UploadReceipt> for UploadResponse {
    fn from(receipt: UploadReceipt) -> Self {
        Self {
            message: UPLOAD_SUCCESS_MESSAGE.to_string(),
            image_url: receipt.image_url,
            warnings: receipt.warnings,
        }
    }
}
