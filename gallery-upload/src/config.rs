//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `GALLERY_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `GALLERY_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `GALLERY_STORAGE__BUCKET=photos.example.com` sets the `storage.bucket` field.
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port`, `max_body_size` - HTTP server binding and request limits
//! - **Storage**: `storage.bucket`, `storage.region`, `storage.endpoint_url` - S3 bucket holding images and the page
//! - **CDN**: `cdn.distribution_id` - CloudFront distribution fronting the bucket
//! - **Gallery**: `gallery.page_key`, `gallery.sections` - which page to patch and the folder → section table
//! - **Images**: `images.allowed_extensions`, `images.jpeg_quality` - accepted uploads and re-encoding
//! - **CORS**: `cors.allow_origin` - headers attached to upload responses
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! GALLERY_PORT=8080
//! GALLERY_STORAGE__BUCKET=photos.example.com
//! GALLERY_CDN__DISTRIBUTION_ID=E123EXAMPLE
//! GALLERY_GALLERY__STRICT_SECTIONS=true
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use crate::clients::codec::{HEIF_EXTENSIONS, WEB_EXTENSIONS, can_decode};
use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "GALLERY_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// Loaded once at startup and shared read-only by every component.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Maximum accepted request body in bytes. The image travels base64 encoded inside the
    /// JSON body, so this needs roughly 4/3 of the largest raw image.
    pub max_body_size: usize,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
    /// Object storage holding the images and the gallery page
    pub storage: StorageConfig,
    /// CDN distribution in front of the bucket
    pub cdn: CdnConfig,
    /// Gallery page and folder → section table
    pub gallery: GalleryConfig,
    /// Accepted image formats and conversion settings
    pub images: ImageConfig,
    /// CORS headers attached to upload responses
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Bucket name (required)
    pub bucket: String,
    /// AWS region override; falls back to the default provider chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, LocalStack)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<Url>,
    /// Use path-style addressing, usually required together with `endpoint_url`
    pub force_path_style: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CdnConfig {
    /// CloudFront distribution ID (required)
    pub distribution_id: String,
    /// Prefix of the invalidation caller reference; a timestamp and random suffix are appended
    pub caller_reference_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GalleryConfig {
    /// Storage key of the gallery page
    pub page_key: String,
    /// Key prefix under which uploaded images are stored, followed by the gallery folder
    pub image_prefix: String,
    /// Public base URL used for `imageUrl` in responses. Defaults to `https://<bucket>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<Url>,
    /// Site name used in slide alt text (`"<site_label> - <section title>"`)
    pub site_label: String,
    /// Placeholder comment found in empty carousels
    pub placeholder_comment: String,
    /// Reject uploads whose folder has no section instead of storing them without a slide
    pub strict_sections: bool,
    /// Write the page back with `If-Match` on the ETag it was read with
    pub conditional_write: bool,
    /// Folder identifier (e.g. "2025-06") → carousel section
    pub sections: BTreeMap<String, SectionConfig>,
}

/// A carousel section on the gallery page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SectionConfig {
    /// Element id stem: the page carries `<id>-slides` and `<id>-counter`
    pub id: String,
    /// Human readable title used in alt text
    pub title: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageConfig {
    /// Lowercase extensions accepted for upload
    pub allowed_extensions: Vec<String>,
    /// Extensions browsers cannot display; these are re-encoded to JPEG
    pub camera_native_extensions: Vec<String>,
    /// Extension → Content-Type for pass-through uploads
    pub content_types: BTreeMap<String, String>,
    /// Content-Type for allowed extensions missing from `content_types`
    pub default_content_type: String,
    /// JPEG quality (1-100) used when re-encoding camera-native uploads
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// `Access-Control-Allow-Origin`, sent on every upload response
    pub allow_origin: String,
    /// `Access-Control-Allow-Headers`, sent on success and preflight
    pub allow_headers: String,
    /// `Access-Control-Allow-Methods`, sent on success and preflight
    pub allow_methods: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            max_body_size: 16 * 1024 * 1024,
            enable_metrics: false,
            enable_otel_export: false,
            storage: StorageConfig::default(),
            cdn: CdnConfig::default(),
            gallery: GalleryConfig::default(),
            images: ImageConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: None,
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            distribution_id: String::new(),
            caller_reference_prefix: "gallery-upload".to_string(),
        }
    }
}

impl Default for GalleryConfig {
    fn default() -> Self {
        let sections = [
            ("2025-06", "jun2025", "June 2025"),
            ("2025-10", "oct2025", "October 2025"),
            ("2026-02", "feb2026", "February 2026"),
        ]
        .into_iter()
        .map(|(folder, id, title)| {
            (
                folder.to_string(),
                SectionConfig {
                    id: id.to_string(),
                    title: title.to_string(),
                },
            )
        })
        .collect();

        Self {
            page_key: "pages/gallery.html".to_string(),
            image_prefix: "images/gallery".to_string(),
            public_base_url: None,
            site_label: "Pescara".to_string(),
            placeholder_comment: "<!-- Photos will be dynamically added here -->".to_string(),
            strict_sections: false,
            conditional_write: false,
            sections,
        }
    }
}

impl Default for ImageConfig {
    /// HEIC/HEIF are only accepted when the build can decode them
    fn default() -> Self {
        let camera_native: &[&str] = if cfg!(feature = "heif") { HEIF_EXTENSIONS } else { &[] };
        Self {
            allowed_extensions: WEB_EXTENSIONS.iter().chain(camera_native).map(|ext| ext.to_string()).collect(),
            camera_native_extensions: camera_native.iter().map(|ext| ext.to_string()).collect(),
            content_types: [("jpg", "image/jpeg"), ("jpeg", "image/jpeg"), ("png", "image/png"), ("gif", "image/gif")]
                .into_iter()
                .map(|(ext, mime)| (ext.to_string(), mime.to_string()))
                .collect(),
            default_content_type: "image/jpeg".to_string(),
            jpeg_quality: 90,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_headers: "Content-Type".to_string(),
            allow_methods: "POST, OPTIONS".to_string(),
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |message: String| Error::Internal {
            operation: format!("validate config: {message}"),
        };

        if self.storage.bucket.trim().is_empty() {
            return Err(invalid(
                "storage.bucket is not set. Set GALLERY_STORAGE__BUCKET or add storage.bucket to the config file".to_string(),
            ));
        }

        if self.cdn.distribution_id.trim().is_empty() {
            return Err(invalid(
                "cdn.distribution_id is not set. Set GALLERY_CDN__DISTRIBUTION_ID or add cdn.distribution_id to the config file"
                    .to_string(),
            ));
        }

        if self.gallery.page_key.trim().is_empty() || self.gallery.page_key.starts_with('/') {
            return Err(invalid(format!(
                "gallery.page_key must be a non-empty relative key (got {:?})",
                self.gallery.page_key
            )));
        }

        if !(1..=100).contains(&self.images.jpeg_quality) {
            return Err(invalid(format!(
                "images.jpeg_quality must be between 1 and 100 (got {})",
                self.images.jpeg_quality
            )));
        }

        if self.images.allowed_extensions.is_empty() {
            return Err(invalid("images.allowed_extensions cannot be empty".to_string()));
        }

        if let Some(ext) = self
            .images
            .allowed_extensions
            .iter()
            .chain(&self.images.camera_native_extensions)
            .find(|ext| ext.is_empty() || ext.chars().any(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit()))
        {
            return Err(invalid(format!("image extensions must be lowercase alphanumeric (got {ext:?})")));
        }

        if let Some(ext) = self
            .images
            .camera_native_extensions
            .iter()
            .find(|ext| !self.images.allowed_extensions.contains(ext))
        {
            return Err(invalid(format!(
                "camera-native extension {ext:?} is not listed in images.allowed_extensions"
            )));
        }

        if let Some(ext) = self.images.camera_native_extensions.iter().find(|ext| !can_decode(ext)) {
            let hint = if HEIF_EXTENSIONS.contains(&ext.as_str()) {
                "; rebuild with the `heif` feature to convert HEIC/HEIF uploads"
            } else {
                ""
            };
            return Err(invalid(format!("camera-native extension {ext:?} cannot be decoded by this build{hint}")));
        }

        for (folder, section) in &self.gallery.sections {
            if !is_identifier(folder) {
                return Err(invalid(format!("gallery folder {folder:?} may only contain letters, digits, '-' and '_'")));
            }
            if !is_identifier(&section.id) {
                return Err(invalid(format!(
                    "section id {:?} for folder {folder:?} may only contain letters, digits, '-' and '_'",
                    section.id
                )));
            }
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            // GALLERY_CONFIG names the file itself and is not a config key
            .merge(Env::prefixed("GALLERY_").ignore(&["config"]).split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL that public image URLs are built from, without a trailing slash
    pub fn public_base_url(&self) -> String {
        match &self.gallery.public_base_url {
            Some(url) => url.as_str().trim_end_matches('/').to_string(),
            None => format!("https://{}", self.storage.bucket),
        }
    }
}

/// Folder names and section ids end up in storage keys and regexes; keep them to a safe alphabet.
pub(crate) fn is_identifier(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
