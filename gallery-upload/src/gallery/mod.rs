//! The upload pipeline.
//!
//! An upload runs as one linear sequence of remote calls, each depending on the previous one:
//!
//! 1. Validate the file name and folder, then normalize the image (no remote calls yet)
//! 2. Store the image under a timestamped key
//! 3. Fetch the gallery page, patch in a slide for the new key, store the page
//! 4. Invalidate the cached page on the CDN
//!
//! Nothing is retried and a failure aborts the remaining steps, so an error after step 2 leaves
//! the image stored without a slide. When the patch changes nothing (unknown folder, carousel
//! and counter both missing) the page is neither rewritten nor invalidated. The page update is
//! a read-modify-write with last-writer-wins semantics unless `gallery.conditional_write` is
//! enabled, in which case the write is conditioned on the ETag the page was read with.

pub mod keys;
pub mod normalize;
pub mod patcher;
pub mod sections;

use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::clients::{cdn::CacheInvalidator, codec::ImageCodec, storage::ObjectStore};
use crate::config::{Config, is_identifier};
use crate::errors::{Error, Result};
use keys::StorageKey;
use normalize::FormatNormalizer;
use patcher::{PagePatcher, PatchOutcome, SlideInsertion};
use sections::SectionTable;

const PAGE_CONTENT_TYPE: &str = "text/html";

/// A decoded upload request
#[derive(Debug, Clone)]
pub struct Upload {
    pub data: Bytes,
    pub file_name: String,
    pub gallery_folder: String,
}

/// Result of a successful upload
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub image_key: String,
    pub image_url: String,
    pub converted: bool,
    pub slide: SlideInsertion,
    pub counters_updated: usize,
    /// CDN invalidation id, `None` when the page did not change
    pub invalidation_id: Option<String>,
    /// Parts of the page update that could not be applied
    pub warnings: Vec<String>,
}

pub struct GalleryService {
    config: Config,
    store: Arc<dyn ObjectStore>,
    cdn: Arc<dyn CacheInvalidator>,
    normalizer: FormatNormalizer,
    patcher: PagePatcher,
    sections: SectionTable,
}

impl GalleryService {
    pub fn new(config: Config, store: Arc<dyn ObjectStore>, cdn: Arc<dyn CacheInvalidator>, codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            normalizer: FormatNormalizer::new(config.images.clone(), codec),
            patcher: PagePatcher::from_config(&config.gallery),
            sections: SectionTable::from(&config.gallery.sections),
            config,
            store,
            cdn,
        }
    }

    /// Checks that need no remote calls and no decoding
    pub fn validate(&self, upload: &Upload) -> Result<()> {
        let name = upload.file_name.trim();
        if name.is_empty() {
            return Err(Error::Validation {
                message: "fileName is required".to_string(),
            });
        }
        if name.contains(['/', '\\']) || name.chars().any(char::is_control) {
            return Err(Error::Validation {
                message: format!("fileName {:?} must be a plain file name", upload.file_name),
            });
        }

        self.normalizer.check_extension(&keys::extension(&upload.file_name))?;

        if !is_identifier(&upload.gallery_folder) {
            return Err(Error::Validation {
                message: format!(
                    "galleryFolder {:?} may only contain letters, digits, '-' and '_'",
                    upload.gallery_folder
                ),
            });
        }

        if self.config.gallery.strict_sections && self.sections.resolve(&upload.gallery_folder).is_none() {
            return Err(Error::Validation {
                message: format!(
                    "Unknown galleryFolder {:?}. Known folders: {}",
                    upload.gallery_folder,
                    self.sections.folders().collect::<Vec<_>>().join(", ")
                ),
            });
        }

        Ok(())
    }

    /// Run the full pipeline for one upload.
    ///
    /// The page write and the CDN invalidation only happen when patching changed the page; an
    /// upload to an unknown folder stores the image and leaves the page and the CDN untouched.
    #[instrument(skip_all, fields(folder = %upload.gallery_folder, file_name = %upload.file_name, size = upload.data.len()))]
    pub async fn upload(&self, upload: Upload) -> Result<UploadReceipt> {
        self.validate(&upload)?;

        let extension = keys::extension(&upload.file_name);
        let image = self.normalizer.normalize(upload.data, &extension).await?;

        let key = StorageKey::build(
            &self.config.gallery.image_prefix,
            &upload.gallery_folder,
            &upload.file_name,
            &image.extension,
            Utc::now(),
        )
        .to_string();

        tracing::info!(key = %key, content_type = %image.content_type, "Uploading image");
        self.store.put(&key, image.data, &image.content_type).await?;

        let outcome = self.update_page(&upload.gallery_folder, &key).await?;
        let warnings = self.warnings(&upload.gallery_folder, &outcome);
        for warning in &warnings {
            tracing::warn!("{warning}");
        }

        let invalidation_id = if outcome.changed() {
            Some(self.invalidate_page().await?)
        } else {
            None
        };

        Ok(UploadReceipt {
            image_url: format!("{}/{}", self.config.public_base_url(), key),
            image_key: key,
            converted: image.converted,
            slide: outcome.slide,
            counters_updated: outcome.counters_updated,
            invalidation_id,
            warnings,
        })
    }

    /// Read, patch and write back the gallery page. The page is not rewritten when nothing matched.
    async fn update_page(&self, folder: &str, image_key: &str) -> Result<PatchOutcome> {
        let page_key = &self.config.gallery.page_key;
        let page = self.store.get(page_key).await?;
        let html = String::from_utf8_lossy(&page.body);

        let outcome = self.patcher.patch(&html, self.sections.resolve(folder), image_key);
        if !outcome.changed() {
            tracing::debug!(page_key = %page_key, "Gallery page unchanged, skipping write");
            return Ok(outcome);
        }

        let body = Bytes::from(outcome.html.clone());
        match (&page.e_tag, self.config.gallery.conditional_write) {
            (Some(e_tag), true) => self.store.put_if_match(page_key, body, PAGE_CONTENT_TYPE, e_tag).await?,
            (None, true) => {
                tracing::warn!(page_key = %page_key, "Gallery page has no ETag, writing unconditionally");
                self.store.put(page_key, body, PAGE_CONTENT_TYPE).await?
            }
            (_, false) => self.store.put(page_key, body, PAGE_CONTENT_TYPE).await?,
        }

        tracing::info!(
            page_key = %page_key,
            slide = ?outcome.slide,
            counters_updated = outcome.counters_updated,
            "Gallery page updated"
        );
        Ok(outcome)
    }

    async fn invalidate_page(&self) -> Result<String> {
        let paths = vec![format!("/{}", self.config.gallery.page_key.trim_start_matches('/'))];
        let caller_reference = format!(
            "{}-{}-{}",
            self.config.cdn.caller_reference_prefix,
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        );

        Ok(self
            .cdn
            .invalidate(&self.config.cdn.distribution_id, &paths, &caller_reference)
            .await?)
    }

    fn warnings(&self, folder: &str, outcome: &PatchOutcome) -> Vec<String> {
        let mut warnings = Vec::new();
        let section = self.sections.resolve(folder);
        match (outcome.slide, section) {
            (SlideInsertion::UnknownFolder, _) => {
                warnings.push(format!(
                    "Gallery folder {folder:?} has no carousel section; the image was stored but not added to the gallery page"
                ));
            }
            (SlideInsertion::SectionNotFound, Some(section)) => {
                warnings.push(format!("Carousel {:?} was not found on the gallery page; no slide was added", section.id));
            }
            _ => {}
        }
        if let (Some(section), 0) = (section, outcome.counters_updated) {
            warnings.push(format!("Photo counter for {:?} was not found on the gallery page", section.id));
        }
        warnings
    }
}
