use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::record::{stem, ModelRecord};
use crate::thumbnail::{FailureReason, Thumbnail};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Base64,
    Url,
    None,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexEntry {
    pub name: String,
    pub title: String,
    pub leds: u64,
    pub width: u64,
    pub height: u64,
    pub brand: String,
    pub download: String,
    #[serde(rename = "imageType")]
    pub image_type: ImageType,
    pub thumbnail: Option<String>,
}

impl IndexEntry {
    pub fn from_record(file_name: &str, rec: &ModelRecord, download_base: &str) -> Self {
        Self {
            name: file_name.to_string(),
            title: rec.title(file_name),
            leds: rec.led_count.unwrap_or(0),
            width: rec.width.unwrap_or(0),
            height: rec.height.unwrap_or(0),
            brand: rec.brand().to_string(),
            download: format!("{download_base}{file_name}"),
            image_type: ImageType::None,
            thumbnail: None,
        }
    }

    /// Placeholder for a file whose JSON could not be parsed.
    pub fn unreadable(file_name: &str, download_base: &str) -> Self {
        Self {
            name: file_name.to_string(),
            title: stem(file_name),
            leds: 0,
            width: 0,
            height: 0,
            brand: "Error".into(),
            download: format!("{download_base}{file_name}"),
            image_type: ImageType::None,
            thumbnail: None,
        }
    }

    pub fn set_thumbnail(&mut self, thumb: Thumbnail) {
        self.thumbnail = Some(thumb.data_uri);
    }
}

#[derive(Debug, Serialize)]
pub struct ModelIndex {
    pub version: String,
    /// RFC 3339 in UTC with an explicit offset (`2026-10-19T08:15:00.123+00:00`).
    /// Indexes written by the older Python generator carry naive local time
    /// without an offset.
    pub updated: String,
    pub count: usize,
    pub thumbnails: u64,
    pub models: Vec<IndexEntry>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub total: usize,
    pub thumbnails: u64,
    pub base64: usize,
    pub url: usize,
    pub none: usize,
    pub unreadable: usize,
    pub failures: BTreeMap<&'static str, u64>,
}

/// Running state of one indexing pass.
#[derive(Debug, Default)]
pub struct IndexAccumulator {
    entries: Vec<IndexEntry>,
    thumbnails: u64,
    unreadable: usize,
    failures: BTreeMap<&'static str, u64>,
}

impl IndexAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: IndexEntry) {
        if entry.thumbnail.is_some() {
            self.thumbnails += 1;
        }
        self.entries.push(entry);
    }

    pub fn push_unreadable(&mut self, entry: IndexEntry) {
        self.unreadable += 1;
        self.entries.push(entry);
    }

    pub fn record_failure(&mut self, reason: &FailureReason) {
        *self.failures.entry(reason.code()).or_default() += 1;
    }

    pub fn stats(&self) -> IndexStats {
        let count = |t: ImageType| self.entries.iter().filter(|e| e.image_type == t).count();
        IndexStats {
            total: self.entries.len(),
            thumbnails: self.thumbnails,
            base64: count(ImageType::Base64),
            url: count(ImageType::Url),
            none: count(ImageType::None),
            unreadable: self.unreadable,
            failures: self.failures.clone(),
        }
    }

    pub fn finish(self, version: &str) -> ModelIndex {
        ModelIndex {
            version: version.to_string(),
            updated: Utc::now().to_rfc3339(),
            count: self.entries.len(),
            thumbnails: self.thumbnails,
            models: self.entries,
        }
    }
}
