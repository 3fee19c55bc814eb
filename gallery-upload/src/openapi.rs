//! OpenAPI document for the upload service, served at `/api-docs/openapi.json` and rendered at
//! `/docs`.

use utoipa::OpenApi;

use crate::api;
use crate::errors::ErrorResponse;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "gallery-upload",
        description = "Upload photos into the gallery page carousels."
    ),
    paths(
        api::handlers::upload::upload_image,
        api::handlers::upload::preflight,
        api::handlers::health::healthz,
    ),
    components(
        schemas(
            api::models::upload::UploadRequest,
            api::models::upload::UploadResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "upload", description = "Image upload. The same endpoint is also mounted at `/`."),
        (name = "health", description = "Liveness probe")
    )
)]
pub struct ApiDoc;
