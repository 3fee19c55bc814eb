use crate::clients::{cdn::CdnError, codec::CodecError, storage::StorageError};
use axum::{
    Json,
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use utoipa::ToSchema;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Upload rejected before any remote call: unsupported extension, bad file name or folder
    #[error("{message}")]
    Validation { message: String },

    /// Request body could not be decoded
    #[error("{message}")]
    BadRequest { message: String },

    /// Request body exceeded `max_body_size`
    #[error("{message}")]
    PayloadTooLarge { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Object storage error
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// CDN invalidation error
    #[error(transparent)]
    Cdn(#[from] CdnError),

    /// Image conversion error
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Error body returned by the upload endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. } | Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Storage(StorageError::PreconditionFailed { .. }) => StatusCode::CONFLICT,
            Error::Internal { .. } | Error::Storage(_) | Error::Cdn(_) | Error::Codec(_) | Error::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message returned to the caller. Upstream failures are passed through so the uploader can
    /// see what went wrong; which side effects already happened is not reported.
    pub fn user_message(&self) -> String {
        match self {
            Error::Other(e) => format!("{e:#}"),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            Error::Validation { .. } | Error::BadRequest { .. } | Error::PayloadTooLarge { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Storage(StorageError::PreconditionFailed { .. }) => {
                tracing::warn!("Conflict error: {}", self);
            }
            _ => {
                tracing::error!("Upload failed: {:#}", self);
            }
        }

        let body = ErrorResponse {
            error: self.user_message(),
        };
        (status, Json(body)).into_response()
    }
}

/// Attach the CORS headers required on every upload response.
///
/// Error responses only carry `Access-Control-Allow-Origin`; success and preflight responses
/// also list the allowed headers and methods.
pub fn with_cors(mut response: Response, cors: &crate::config::CorsConfig) -> Response {
    let full = response.status().is_success();
    let headers = response.headers_mut();

    let mut insert = |name: HeaderName, value: &str| match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(e) => tracing::warn!(header = %name, error = %e, "Skipping invalid CORS header value"),
    };

    insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, &cors.allow_origin);
    if full {
        insert(header::ACCESS_CONTROL_ALLOW_HEADERS, &cors.allow_headers);
        insert(header::ACCESS_CONTROL_ALLOW_METHODS, &cors.allow_methods);
    }
    response
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
