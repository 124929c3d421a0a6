//! Implements AnchorStore using a single JSON file (`anchors.json`).
//!
//! Layout: channel (no `@`) -> date -> anchor.

use std::path::{Path, PathBuf};

use tracing::warn;

use super::json_file::{read_json, write_json_atomic};
use crate::domain::entities::clean_channel;
use crate::domain::{Anchor, DomainError};
use crate::ports::{AnchorMap, AnchorStore};

/// JSON file-based anchor storage with an in-memory copy.
pub struct AnchorsJson {
    path: PathBuf,
    cache: tokio::sync::RwLock<AnchorMap>,
}

impl AnchorsJson {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cache: tokio::sync::RwLock::new(AnchorMap::new()),
        }
    }

    /// Load anchors from disk. A missing or corrupt file starts empty.
    pub async fn load(&self) -> Result<(), DomainError> {
        let data = match read_json::<AnchorMap>(&self.path, DomainError::Anchor).await {
            Ok(Some(map)) => map,
            Ok(None) => AnchorMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "anchors file unreadable, starting empty");
                AnchorMap::new()
            }
        };
        *self.cache.write().await = data;
        Ok(())
    }

    async fn save(&self) -> Result<(), DomainError> {
        let data = self.cache.read().await;
        write_json_atomic(&self.path, &*data, DomainError::Anchor).await
    }
}

#[async_trait::async_trait]
impl AnchorStore for AnchorsJson {
    async fn get(&self, channel: &str, date: &str) -> Result<Option<Anchor>, DomainError> {
        let cache = self.cache.read().await;
        Ok(cache
            .get(&clean_channel(channel))
            .and_then(|dates| dates.get(date))
            .cloned())
    }

    async fn set(&self, channel: &str, anchor: Anchor) -> Result<(), DomainError> {
        {
            let mut cache = self.cache.write().await;
            cache
                .entry(clean_channel(channel))
                .or_default()
                .insert(anchor.date.clone(), anchor);
        }
        self.save().await
    }

    async fn all(&self) -> Result<AnchorMap, DomainError> {
        Ok(self.cache.read().await.clone())
    }

    async fn replace_all(&self, anchors: AnchorMap) -> Result<(), DomainError> {
        *self.cache.write().await = anchors;
        self.save().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(id: i64, date: &str) -> Anchor {
        Anchor {
            message_id: id,
            timestamp: "08:00:00".into(),
            date: date.into(),
            created_at: None,
            anchor_version: "1.0".into(),
        }
    }

    #[tokio::test]
    async fn test_set_get_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anchors.json");

        let store = AnchorsJson::new(&path);
        store.load().await.unwrap();
        store.set("@aiclub", anchor(100, "2025-09-14")).await.unwrap();

        let reloaded = AnchorsJson::new(&path);
        reloaded.load().await.unwrap();
        let got = reloaded.get("aiclub", "2025-09-14").await.unwrap().unwrap();
        assert_eq!(got.message_id, 100);
        assert!(reloaded.get("aiclub", "2025-09-13").await.unwrap().is_none());

        let raw: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(raw["aiclub"]["2025-09-14"]["message_id"], 100);
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anchors.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let store = AnchorsJson::new(&path);
        store.load().await.unwrap();
        assert!(store.all().await.unwrap().is_empty());
    }
}
