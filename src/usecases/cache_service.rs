//! Snapshot lifecycle: TTL checks, cleanup and per-channel listings.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::entities::normalize_channel;
use crate::domain::{DateFilter, DomainError};
use crate::ports::{SnapshotFile, SnapshotStore};
use crate::shared::clock::LocalClock;

pub const DEFAULT_KEEP_LATEST: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheCheck {
    pub channel: String,
    pub filter: String,
    pub valid: bool,
    pub path: Option<PathBuf>,
    /// Age from the timestamp in the file name.
    pub age_minutes: Option<i64>,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheFileInfo {
    pub file_name: String,
    pub age_minutes: i64,
    pub size: u64,
    /// `None` when the file could not be read.
    pub messages: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelCacheInfo {
    pub channel: String,
    pub files: Vec<CacheFileInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheInfo {
    pub dir: PathBuf,
    pub total_files: usize,
    pub total_size: u64,
    pub channels: Vec<ChannelCacheInfo>,
}

pub struct CacheService {
    snapshots: Arc<dyn SnapshotStore>,
    clock: LocalClock,
}

impl CacheService {
    pub fn new(snapshots: Arc<dyn SnapshotStore>, clock: LocalClock) -> Self {
        Self { snapshots, clock }
    }

    fn age_minutes(&self, file: &SnapshotFile) -> i64 {
        (self.clock.now_naive() - file.created).num_minutes()
    }

    /// Whether the newest snapshot is still within the TTL of `filter`.
    pub async fn check(&self, channel: &str, filter: &DateFilter) -> Result<CacheCheck, DomainError> {
        let channel = normalize_channel(channel);
        let ttl_minutes = filter.ttl_minutes();
        let newest = self.snapshots.list(Some(&channel)).await?.into_iter().next();
        let age_minutes = newest.as_ref().map(|f| self.age_minutes(f));
        Ok(CacheCheck {
            valid: age_minutes.is_some_and(|age| age < ttl_minutes),
            filter: filter.to_string(),
            path: newest.map(|f| f.path),
            channel,
            age_minutes,
            ttl_minutes,
        })
    }

    /// Modification time older than `max_age_minutes`.
    pub fn is_stale(&self, file: &SnapshotFile, max_age_minutes: i64) -> bool {
        let now = self.clock.now().with_timezone(&Utc);
        (now - file.modified).num_minutes() >= max_age_minutes
    }

    /// Keep the newest `keep` snapshots per channel; returns removed paths.
    pub async fn clean(
        &self,
        channel: Option<&str>,
        keep: usize,
    ) -> Result<Vec<PathBuf>, DomainError> {
        let wanted = channel.map(normalize_channel);
        let mut per_channel: BTreeMap<String, Vec<SnapshotFile>> = BTreeMap::new();
        for file in self.snapshots.list(wanted.as_deref()).await? {
            per_channel.entry(file.channel.clone()).or_default().push(file);
        }

        let mut removed = Vec::new();
        for files in per_channel.into_values() {
            for old in files.into_iter().skip(keep) {
                self.snapshots.remove(&old.path).await?;
                removed.push(old.path);
            }
        }
        info!(removed = removed.len(), keep, "cache cleanup complete");
        Ok(removed)
    }

    pub async fn info(&self) -> Result<CacheInfo, DomainError> {
        let files = self.snapshots.list(None).await?;
        let total_files = files.len();
        let total_size = files.iter().map(|f| f.size).sum();

        let mut per_channel: BTreeMap<String, Vec<CacheFileInfo>> = BTreeMap::new();
        for file in files {
            let messages = match self.snapshots.load(&file.path).await {
                Ok(s) => Some(s.messages.len()),
                Err(e) => {
                    warn!(path = %file.path.display(), error = %e, "unreadable snapshot");
                    None
                }
            };
            let info = CacheFileInfo {
                file_name: file
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                age_minutes: self.age_minutes(&file),
                size: file.size,
                messages,
            };
            per_channel
                .entry(normalize_channel(&file.channel))
                .or_default()
                .push(info);
        }

        let channels = per_channel
            .into_iter()
            .map(|(channel, mut files)| {
                files.sort_by_key(|f| f.age_minutes);
                ChannelCacheInfo { channel, files }
            })
            .collect();

        Ok(CacheInfo {
            dir: self.snapshots.dir().to_path_buf(),
            total_files,
            total_size,
            channels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::message_at;
    use crate::adapters::persistence::FsSnapshotStore;
    use crate::domain::{FetchStrategy, Snapshot};
    use chrono::FixedOffset;

    fn clock() -> LocalClock {
        // 2025-09-15 12:30 local
        LocalClock::fixed(
            "2025-09-15T09:30:00Z".parse().unwrap(),
            FixedOffset::east_opt(3 * 3600).unwrap(),
        )
    }

    async fn seed(store: &FsSnapshotStore, channel: &str, stamps: &[&str]) {
        for stamp in stamps {
            let snapshot = Snapshot::new(
                channel,
                clock().now(),
                FetchStrategy::Manual,
                vec![message_at(1, "2025-09-15 10:00:00", "x")],
            );
            store.save(&snapshot, stamp, None).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_ttl_check_uses_name_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsSnapshotStore::new(dir.path()));
        seed(&store, "@aiclub", &["20250915_122700"]).await;
        let service = CacheService::new(store, clock());

        let today = service.check("aiclub", &DateFilter::Today).await.unwrap();
        assert_eq!(today.age_minutes, Some(3));
        assert!(today.valid);

        let service_later = CacheService::new(
            Arc::new(FsSnapshotStore::new(dir.path())),
            LocalClock::fixed(
                "2025-09-15T09:40:00Z".parse().unwrap(),
                FixedOffset::east_opt(3 * 3600).unwrap(),
            ),
        );
        let stale = service_later.check("@aiclub", &DateFilter::Today).await.unwrap();
        assert!(!stale.valid);
        let recent = service_later.check("@aiclub", &DateFilter::LastDays(7)).await.unwrap();
        assert!(recent.valid);

        let none = service.check("@nobody", &DateFilter::All).await.unwrap();
        assert!(!none.valid);
        assert!(none.path.is_none());
    }

    #[tokio::test]
    async fn test_clean_keeps_newest_per_channel() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsSnapshotStore::new(dir.path()));
        seed(
            &store,
            "@aiclub",
            &["20250910_100000", "20250911_100000", "20250912_100000", "20250913_100000"],
        )
        .await;
        seed(&store, "@other", &["20250913_100000"]).await;
        let service = CacheService::new(store.clone(), clock());

        let removed = service.clean(None, 3).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(store.list(Some("@aiclub")).await.unwrap().len(), 3);
        assert_eq!(store.list(Some("@other")).await.unwrap().len(), 1);

        let info = service.info().await.unwrap();
        assert_eq!(info.total_files, 4);
        assert_eq!(info.channels.len(), 2);
        assert_eq!(info.channels[0].channel, "@aiclub");
        assert_eq!(info.channels[0].files[0].messages, Some(1));
    }

    #[tokio::test]
    async fn test_mtime_staleness() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        seed(&store, "@aiclub", &["20250915_120000"]).await;
        let file = store.list(None).await.unwrap().remove(0);

        let now = CacheService::new(
            Arc::new(FsSnapshotStore::new(dir.path())),
            LocalClock::system(FixedOffset::east_opt(3 * 3600).unwrap()),
        );
        assert!(!now.is_stale(&file, 60));

        let future = CacheService::new(
            Arc::new(FsSnapshotStore::new(dir.path())),
            LocalClock::fixed(
                "2100-01-01T00:00:00Z".parse().unwrap(),
                FixedOffset::east_opt(3 * 3600).unwrap(),
            ),
        );
        assert!(future.is_stale(&file, 60));
    }
}
