//! # gallery-upload: photo uploads for a static gallery site
//!
//! `gallery-upload` accepts a base64 encoded image over HTTP, stores it in an S3 bucket, adds it
//! as a slide to the matching carousel of a static HTML gallery page, and invalidates the cached
//! page on CloudFront.
//!
//! ## Request flow
//!
//! `POST /upload` decodes the JSON body (`file`, `fileName`, `galleryFolder`) and hands it to
//! [`gallery::GalleryService`], which:
//!
//! 1. rejects unsupported extensions and malformed names before any remote call,
//! 2. converts camera-native images to JPEG ([`gallery::normalize`]); HEIC/HEIF needs the `heif`
//!    feature,
//! 3. stores the image under `images/gallery/<folder>/<timestamp>_<name>.<ext>`
//!    ([`gallery::keys`]),
//! 4. patches the gallery page: a new slide in the folder's carousel and a bumped photo counter
//!    ([`gallery::patcher`]),
//! 5. invalidates `/pages/gallery.html` on the CDN.
//!
//! The storage, CDN and image codec collaborators live behind traits in [`clients`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use gallery_upload::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = gallery_upload::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     gallery_upload::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await
//! }
//! ```
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod clients;
pub mod config;
pub mod errors;
pub mod gallery;
mod openapi;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::clients::{
    cdn::{CacheInvalidator, CloudFrontInvalidator},
    codec::{ImageCodec, default_codec},
    storage::{ObjectStore, S3ObjectStore},
};
use crate::gallery::GalleryService;
use crate::openapi::ApiDoc;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .service(Arc::new(service))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub service: Arc<GalleryService>,
}

/// Build the shared AWS config, honouring the optional region override.
async fn load_aws_config(config: &Config) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = &config.storage.region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }
    loader.load().await
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let max_body_size = state.config.max_body_size;
    let enable_metrics = state.config.enable_metrics;

    let upload = post(api::handlers::upload::upload_image).options(api::handlers::upload::preflight);

    let mut router = Router::new()
        .route("/", upload.clone())
        .route("/upload", upload)
        .route("/healthz", get(api::handlers::health::healthz))
        .layer(DefaultBodyLimit::max(max_body_size))
        .with_state(state)
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    if enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

/// Main application struct.
///
/// 1. **Create**: [`Application::new`] builds the AWS clients and validates the config
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests until the
///    shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance backed by S3 and CloudFront
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting gallery upload service with configuration: {:#?}", config);

        let sdk_config = load_aws_config(&config).await;
        let store = Arc::new(S3ObjectStore::from_config(&sdk_config, &config.storage));
        let cdn = Arc::new(CloudFrontInvalidator::from_config(&sdk_config));

        Self::with_clients(config, store, cdn, default_codec())
    }

    /// Create an application instance around the given collaborators. Fails if the config is invalid.
    pub fn with_clients(
        config: Config,
        store: Arc<dyn ObjectStore>,
        cdn: Arc<dyn CacheInvalidator>,
        codec: Arc<dyn ImageCodec>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let service = GalleryService::new(config.clone(), store, cdn, codec);
        let state = AppState::builder().config(config.clone()).service(Arc::new(service)).build();
        let router = build_router(state);

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            bucket = %self.config.storage.bucket,
            page = %self.config.gallery.page_key,
            "Gallery upload service listening on http://{}",
            listener.local_addr()?
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
