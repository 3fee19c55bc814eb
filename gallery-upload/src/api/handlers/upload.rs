use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::api::models::upload::{UploadRequest, UploadResponse};
use crate::errors::{Error, ErrorResponse, Result, with_cors};

#[utoipa::path(
    post,
    path = "/upload",
    tag = "upload",
    summary = "Upload image",
    description = "Store an image in the gallery bucket, add it to its folder's carousel on the gallery page and invalidate the cached page.

Rejected with 400 before anything is stored:
- an extension outside `images.allowed_extensions`
- a `fileName` that is empty or contains `/`, `\\` or control characters
- a `galleryFolder` with characters outside `[A-Za-z0-9_-]`
- a `galleryFolder` without a carousel section, when `gallery.strict_sections` is enabled

Camera-native uploads (HEIC/HEIF in builds with the `heif` feature) are converted to JPEG. Folders without a carousel section store the image but leave the page untouched with no CDN invalidation; the response then carries `warnings`.",
    request_body = UploadRequest,
    responses(
        (status = 200, description = "Image stored and gallery updated", body = UploadResponse),
        (status = 400, description = "Unsupported file type, bad file name or folder, or malformed body", body = ErrorResponse),
        (status = 409, description = "Gallery page changed while it was being updated", body = ErrorResponse),
        (status = 413, description = "Payload too large", body = ErrorResponse),
        (status = 500, description = "Storage, conversion or CDN failure", body = ErrorResponse)
    )
)]
pub async fn upload_image(State(state): State<AppState>, payload: std::result::Result<Json<UploadRequest>, JsonRejection>) -> Response {
    let response = match handle_upload(&state, payload).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => e.into_response(),
    };
    with_cors(response, &state.config.cors)
}

async fn handle_upload(state: &AppState, payload: std::result::Result<Json<UploadRequest>, JsonRejection>) -> Result<UploadResponse> {
    let Json(request) = payload.map_err(rejection_error)?;
    let receipt = state.service.upload(request.into_upload()?).await?;

    tracing::info!(
        image_url = %receipt.image_url,
        converted = receipt.converted,
        invalidation_id = receipt.invalidation_id.as_deref().unwrap_or("-"),
        "Upload complete"
    );
    Ok(receipt.into())
}

fn rejection_error(rejection: JsonRejection) -> Error {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge {
            message: rejection.body_text(),
        }
    } else {
        Error::BadRequest {
            message: rejection.body_text(),
        }
    }
}

#[utoipa::path(
    options,
    path = "/upload",
    tag = "upload",
    summary = "CORS preflight",
    responses(
        (status = 204, description = "Preflight accepted")
    )
)]
pub async fn preflight(State(state): State<AppState>) -> Response {
    with_cors(StatusCode::NO_CONTENT.into_response(), &state.config.cors)
}
