#[utoipa::path(
    get,
    path = "/healthz",
    tag = "health",
    summary = "Liveness check",
    responses(
        (status = 200, description = "Service is running", body = String, content_type = "text/plain")
    )
)]
pub async fn healthz() -> &'static str {
    "ok"
}
