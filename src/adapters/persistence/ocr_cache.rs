//! OCR result cache (`media_ocr_cache.json`).
//!
//! Constructed explicitly and passed to whoever needs it; no global instance.
//! Writes only happen through [`OcrCache::save`] and only when something changed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::json_file::{read_json, write_json_atomic};
use crate::domain::DomainError;
use crate::domain::entities::{clean_channel, preview};

pub const OCR_CACHE_FILE: &str = "media_ocr_cache.json";
const CACHE_VERSION: u32 = 1;
const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrEntry {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OcrCacheFile {
    version: u32,
    entries: BTreeMap<String, OcrEntry>,
}

impl Default for OcrCacheFile {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

pub struct OcrCache {
    path: PathBuf,
    data: OcrCacheFile,
    dirty: bool,
}

impl OcrCache {
    /// Load from `path`. Missing or corrupt files give an empty cache.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let data = match read_json::<OcrCacheFile>(&path, DomainError::Store).await {
            Ok(Some(data)) => data,
            Ok(None) => OcrCacheFile::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "OCR cache unreadable, starting fresh");
                OcrCacheFile::default()
            }
        };
        debug!(entries = data.entries.len(), "OCR cache loaded");
        Self {
            path,
            data,
            dirty: false,
        }
    }

    pub fn key(channel: &str, message_id: i32) -> String {
        format!("{}|{}", clean_channel(channel), message_id)
    }

    pub fn get_entry(&self, channel: &str, message_id: i32) -> Option<&OcrEntry> {
        self.data.entries.get(&Self::key(channel, message_id))
    }

    /// Insert or replace. Returns false (and stays clean) when the entry is unchanged.
    pub fn upsert_entry(&mut self, channel: &str, message_id: i32, entry: OcrEntry) -> bool {
        let key = Self::key(channel, message_id);
        if self.data.entries.get(&key) == Some(&entry) {
            return false;
        }
        self.data.entries.insert(key, entry);
        self.dirty = true;
        true
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.data.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.entries.is_empty()
    }

    /// Persist when dirty. Returns whether a write happened.
    pub async fn save(&mut self) -> Result<bool, DomainError> {
        if !self.dirty {
            return Ok(false);
        }
        self.data.version = CACHE_VERSION;
        write_json_atomic(&self.path, &self.data, DomainError::Store).await?;
        self.dirty = false;
        Ok(true)
    }

    /// OCR text for display, cut to 200 characters.
    pub fn preview(&self, channel: &str, message_id: i32) -> Option<String> {
        let text = self.get_entry(channel, message_id)?.text.trim();
        if text.is_empty() {
            return None;
        }
        if text.chars().count() > PREVIEW_CHARS {
            Some(preview(text, PREVIEW_CHARS - 3))
        } else {
            Some(text.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str) -> OcrEntry {
        OcrEntry {
            text: text.to_string(),
            content_hash: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_save_only_when_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(OCR_CACHE_FILE);

        let mut cache = OcrCache::load(&path).await;
        assert!(cache.is_empty());
        assert!(!cache.save().await.unwrap());
        assert!(!path.exists());

        assert!(cache.upsert_entry("@aiclub", 5, entry("slide text")));
        assert!(!cache.upsert_entry("aiclub", 5, entry("slide text")));
        assert!(cache.save().await.unwrap());
        assert!(!cache.is_dirty());

        let reloaded = OcrCache::load(&path).await;
        assert_eq!(reloaded.get_entry("@aiclub", 5).unwrap().text, "slide text");
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(raw.contains("\"aiclub|5\""));
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(OCR_CACHE_FILE);
        tokio::fs::write(&path, "{{{").await.unwrap();
        let cache = OcrCache::load(&path).await;
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_preview_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = OcrCache::load(dir.path().join(OCR_CACHE_FILE)).await;
        cache.upsert_entry("c", 1, entry(&"x".repeat(250)));
        cache.upsert_entry("c", 2, entry("short"));

        let p = cache.preview("c", 1).unwrap();
        assert_eq!(p.chars().count(), 200);
        assert!(p.ends_with("..."));
        assert_eq!(cache.preview("c", 2).unwrap(), "short");
        assert!(cache.preview("c", 3).is_none());
    }
}
