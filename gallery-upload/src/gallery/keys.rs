//! Storage keys for uploaded images.
//!
//! Keys look like `images/gallery/2025-06/20250614T183205_IMG_0042.jpg`: the configured prefix,
//! the gallery folder, then a UTC timestamp in ISO-8601 basic form joined to the original file
//! name (minus its extension) and the stored extension. Timestamps have one second resolution,
//! so two uploads of the same file name in the same second map to the same key.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKey {
    pub prefix: String,
    pub folder: String,
    pub timestamp: String,
    pub basename: String,
    pub extension: String,
}

impl StorageKey {
    /// Build the key for an upload of `file_name` stored with `extension` at `now`.
    pub fn build(prefix: &str, folder: &str, file_name: &str, extension: &str, now: DateTime<Utc>) -> Self {
        Self {
            prefix: prefix.trim_matches('/').to_string(),
            folder: folder.to_string(),
            timestamp: format_timestamp(now),
            basename: basename(file_name).to_string(),
            extension: extension.to_string(),
        }
    }

    /// Split a key produced by [`StorageKey::build`] back into its parts.
    pub fn parse(key: &str) -> Option<Self> {
        let (rest, file) = key.rsplit_once('/')?;
        let (prefix, folder) = rest.rsplit_once('/').unwrap_or(("", rest));
        let (stem, extension) = file.rsplit_once('.')?;
        let (timestamp, basename) = stem.split_once('_')?;

        NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?;

        Some(Self {
            prefix: prefix.to_string(),
            folder: folder.to_string(),
            timestamp: timestamp.to_string(),
            basename: basename.to_string(),
            extension: extension.to_string(),
        })
    }

    /// Upload time encoded in the key
    pub fn uploaded_at(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.timestamp, TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.prefix.is_empty() {
            write!(f, "{}/", self.prefix)?;
        }
        write!(f, "{}/{}_{}.{}", self.folder, self.timestamp, self.basename, self.extension)
    }
}

/// `2025-06-14T18:32:05.123Z` → `20250614T183205`
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// File name without its last extension (`a.b.heic` → `a.b`)
pub fn basename(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => stem,
        _ => file_name,
    }
}

/// Lowercase last extension of `file_name`; the whole name when it has no dot.
pub fn extension(file_name: &str) -> String {
    file_name.rsplit('.').next().unwrap_or(file_name).to_lowercase()
}
