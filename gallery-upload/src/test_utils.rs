//! In-memory fakes and fixtures shared by the unit and handler tests.

use async_trait::async_trait;
use axum_test::TestServer;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use crate::clients::cdn::{CacheInvalidator, CdnError};
use crate::clients::codec::default_codec;
use crate::clients::storage::{ObjectStore, Result, StorageError, StoredObject};
use crate::config::Config;

pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.storage.bucket = "photos.example.com".to_string();
    config.cdn.distribution_id = "E123EXAMPLE".to_string();
    config
}

/// Build a test server backed by in-memory fakes seeded with [`sample_gallery_page`].
pub fn create_test_app(config: Config) -> (TestServer, Arc<InMemoryObjectStore>, Arc<RecordingInvalidator>) {
    let store = Arc::new(InMemoryObjectStore::new());
    store.insert(&config.gallery.page_key, sample_gallery_page());
    let cdn = Arc::new(RecordingInvalidator::default());

    let server = create_test_app_with(config, store.clone(), cdn.clone());
    (server, store, cdn)
}

pub fn create_test_app_with(config: Config, store: Arc<InMemoryObjectStore>, cdn: Arc<RecordingInvalidator>) -> TestServer {
    crate::Application::with_clients(config, store, cdn, default_codec())
        .expect("Failed to create application")
        .into_test_server()
}

/// Small PNG image, decodable by the `image` crate
pub fn png_bytes() -> Bytes {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 9, Rgb([30, 144, 255])));
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("Failed to encode test PNG");
    Bytes::from(buf)
}

/// 16x8 HEIC image, encoded with libheif (which must have an HEVC encoder)
#[cfg(feature = "heif")]
pub fn heic_bytes() -> Bytes {
    use libheif_rs::{Channel, ColorSpace, CompressionFormat, EncoderQuality, HeifContext, Image, LibHeif, RgbChroma};

    let (width, height) = (16, 8);
    let mut image = Image::new(width, height, ColorSpace::Rgb(RgbChroma::Rgb)).expect("Failed to allocate HEIC image");
    image
        .create_plane(Channel::Interleaved, width, height, 8)
        .expect("Failed to create HEIC plane");

    let planes = image.planes_mut();
    let plane = planes.interleaved.expect("Missing interleaved plane");
    for y in 0..height as usize {
        let row = &mut plane.data[y * plane.stride..];
        for pixel in row[..width as usize * 3].chunks_exact_mut(3) {
            pixel.copy_from_slice(&[30, 144, 255]);
        }
    }

    let lib_heif = LibHeif::new();
    let mut context = HeifContext::new().expect("Failed to create HEIF context");
    let mut encoder = lib_heif
        .encoder_for_format(CompressionFormat::Hevc)
        .expect("libheif has no HEVC encoder");
    encoder.set_quality(EncoderQuality::LossLess).expect("Failed to set encoder quality");
    context.encode_image(&image, &mut encoder, None).expect("Failed to encode HEIC");
    Bytes::from(context.write_to_bytes().expect("Failed to write HEIC"))
}

/// Gallery page with three empty carousels (jun2025, oct2025, feb2026)
pub fn sample_gallery_page() -> String {
    let section = |id: &str, title: &str| {
        format!(
            r#"            <section class="gallery-section">
                <h2>{title}</h2>
                <div class="carousel-container">
                    <button class="carousel-btn prev" onclick="moveSlide('{id}', -1)">&#10094;</button>
                    <div class="carousel-slides" id="{id}-slides">
                        <!-- Photos will be dynamically added here -->
                    </div>
                    <!-- Next Button -->
                    <button class="carousel-btn next" onclick="moveSlide('{id}', 1)">&#10095;</button>
                </div>
                <div class="photo-counter" id="{id}-counter">1 / 0</div>
            </section>
"#
        )
    };

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n    <title>Gallery</title>\n</head>\n<body>\n        <main>\n{}{}{}        </main>\n</body>\n</html>\n",
        section("jun2025", "June 2025"),
        section("oct2025", "October 2025"),
        section("feb2026", "February 2026"),
    )
}

#[derive(Debug, Clone)]
pub struct MemoryObject {
    pub body: Bytes,
    pub content_type: String,
    pub e_tag: String,
}

/// Object store kept in memory, counting calls
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, MemoryObject>>,
    versions: AtomicUsize,
    puts: AtomicUsize,
    gets: AtomicUsize,
    /// Keys whose object is replaced by a "concurrent writer" right after the next get
    race_after_get: Mutex<HashSet<String>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting it as a put
    pub fn insert(&self, key: &str, body: impl Into<Bytes>) {
        let object = self.version(body.into(), "text/html");
        self.objects.lock().unwrap().insert(key.to_string(), object);
    }

    pub fn object(&self, key: &str) -> Option<MemoryObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.object(key).map(|o| String::from_utf8_lossy(&o.body).into_owned())
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn change_page_during_next_get(&self, key: &str) {
        self.race_after_get.lock().unwrap().insert(key.to_string());
    }

    fn version(&self, body: Bytes, content_type: &str) -> MemoryObject {
        let version = self.versions.fetch_add(1, Ordering::SeqCst);
        MemoryObject {
            body,
            content_type: content_type.to_string(),
            e_tag: format!("\"v{version}\""),
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let object = self.version(body, content_type);
        self.objects.lock().unwrap().insert(key.to_string(), object);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoredObject> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let object = self.object(key).ok_or_else(|| StorageError::NotFound { key: key.to_string() })?;

        if self.race_after_get.lock().unwrap().remove(key) {
            let replaced = self.version(object.body.clone(), &object.content_type);
            self.objects.lock().unwrap().insert(key.to_string(), replaced);
        }

        Ok(StoredObject {
            body: object.body,
            e_tag: Some(object.e_tag),
        })
    }

    async fn put_if_match(&self, key: &str, body: Bytes, content_type: &str, e_tag: &str) -> Result<()> {
        let current = self.object(key).map(|o| o.e_tag);
        if current.as_deref() != Some(e_tag) {
            return Err(StorageError::PreconditionFailed { key: key.to_string() });
        }
        self.put(key, body, content_type).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationCall {
    pub distribution_id: String,
    pub paths: Vec<String>,
    pub caller_reference: String,
}

/// Invalidator that records every request
#[derive(Default)]
pub struct RecordingInvalidator {
    calls: Mutex<Vec<InvalidationCall>>,
    fail: bool,
}

impl RecordingInvalidator {
    /// An invalidator whose requests always fail
    pub fn failing() -> Self {
        Self {
            calls: Mutex::default(),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<InvalidationCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CacheInvalidator for RecordingInvalidator {
    async fn invalidate(&self, distribution_id: &str, paths: &[String], caller_reference: &str) -> std::result::Result<String, CdnError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(InvalidationCall {
            distribution_id: distribution_id.to_string(),
            paths: paths.to_vec(),
            caller_reference: caller_reference.to_string(),
        });

        if self.fail {
            return Err(CdnError::Provider {
                distribution_id: distribution_id.to_string(),
                paths: paths.to_vec(),
                message: "AccessDenied".to_string(),
            });
        }
        Ok(format!("I{}", calls.len()))
    }
}
