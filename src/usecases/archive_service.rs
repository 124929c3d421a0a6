//! Daily archive: freeze the newest snapshot of a channel under its date.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::entities::{ArchiveMeta, clean_channel, normalize_channel};
use crate::domain::{DomainError, Snapshot};
use crate::ports::{ArchiveEntry, ArchiveStore, SnapshotStore};
use crate::shared::clock::LocalClock;

pub const PERSISTENCE_VERSION: &str = "1.0";
pub const DEFAULT_ARCHIVE_RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArchiveStats {
    pub total_dates: usize,
    pub total_caches: usize,
    pub total_size: u64,
    pub oldest_date: Option<NaiveDate>,
    pub newest_date: Option<NaiveDate>,
    pub channels: Vec<String>,
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date_dir(name: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(name, "%Y-%m-%d").ok()
}

pub struct ArchiveService {
    snapshots: Arc<dyn SnapshotStore>,
    archive: Arc<dyn ArchiveStore>,
    clock: LocalClock,
}

impl ArchiveService {
    pub fn new(
        snapshots: Arc<dyn SnapshotStore>,
        archive: Arc<dyn ArchiveStore>,
        clock: LocalClock,
    ) -> Self {
        Self {
            snapshots,
            archive,
            clock,
        }
    }

    /// Copy the newest snapshot into the archive for `date` (today by default).
    pub async fn archive_latest(
        &self,
        channel: &str,
        date: Option<NaiveDate>,
    ) -> Result<PathBuf, DomainError> {
        let channel = normalize_channel(channel);
        let date = date.unwrap_or_else(|| self.clock.today());
        let source = self
            .snapshots
            .latest(&channel)
            .await?
            .ok_or_else(|| DomainError::NoCache(channel.clone()))?;

        let mut snapshot = self.snapshots.load(&source).await?;
        snapshot.meta.archive = Some(ArchiveMeta {
            archived_at: self.clock.now(),
            archive_date: date,
            persistence_version: PERSISTENCE_VERSION.to_string(),
        });
        let path = self.archive.write(&channel, &date_key(date), &snapshot).await?;
        info!(channel = %channel, %date, source = %source.display(), "daily cache archived");
        Ok(path)
    }

    /// Copy an archived day back into the cache directory as
    /// `<channel>_<YYYYMMDD>_000000_restored.json`.
    pub async fn restore(&self, channel: &str, date: NaiveDate) -> Result<PathBuf, DomainError> {
        let snapshot = self.get(channel, date).await?.ok_or_else(|| {
            DomainError::NotFound(format!("no daily cache for {} on {}", channel, date))
        })?;
        let name = format!(
            "{}_{}_000000_restored.json",
            clean_channel(channel),
            date.format("%Y%m%d")
        );
        let path = self.snapshots.dir().join(name);
        self.snapshots.save_as(&path, &snapshot).await?;
        info!(channel, %date, path = %path.display(), "daily cache restored");
        Ok(path)
    }

    pub async fn get(&self, channel: &str, date: NaiveDate) -> Result<Option<Snapshot>, DomainError> {
        self.archive.read(channel, &date_key(date)).await
    }

    pub async fn list(&self, channel: Option<&str>) -> Result<Vec<ArchiveEntry>, DomainError> {
        self.archive.list(channel).await
    }

    /// Remove date directories older than `retention_days`. Directories that
    /// are not dates are left alone.
    pub async fn cleanup(&self, retention_days: i64) -> Result<usize, DomainError> {
        let cutoff = self.clock.today() - Duration::days(retention_days);
        let mut removed = 0usize;
        for name in self.archive.dates().await? {
            let Some(date) = parse_date_dir(&name) else {
                debug!(dir = %name, "skipping non-date directory");
                continue;
            };
            if date < cutoff {
                self.archive.remove_date(&name).await?;
                removed += 1;
            }
        }
        info!(removed, retention_days, "daily archive cleanup complete");
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<ArchiveStats, DomainError> {
        let dates: Vec<NaiveDate> = self
            .archive
            .dates()
            .await?
            .iter()
            .filter_map(|d| parse_date_dir(d))
            .collect();
        let entries: Vec<ArchiveEntry> = self
            .archive
            .list(None)
            .await?
            .into_iter()
            .filter(|e| parse_date_dir(&e.date).is_some())
            .collect();
        let channels: BTreeSet<String> = entries
            .iter()
            .map(|e| normalize_channel(&e.channel))
            .collect();

        Ok(ArchiveStats {
            total_dates: dates.len(),
            total_caches: entries.len(),
            total_size: entries.iter().map(|e| e.size).sum(),
            oldest_date: dates.iter().min().copied(),
            newest_date: dates.iter().max().copied(),
            channels: channels.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::message_at;
    use crate::adapters::persistence::{FsArchiveStore, FsSnapshotStore};
    use crate::domain::FetchStrategy;
    use chrono::FixedOffset;

    struct Fixture {
        dir: tempfile::TempDir,
        snapshots: Arc<FsSnapshotStore>,
        service: ArchiveService,
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let clock = LocalClock::fixed(
            "2025-09-15T09:30:00Z".parse().unwrap(),
            FixedOffset::east_opt(3 * 3600).unwrap(),
        );
        let snapshots = Arc::new(FsSnapshotStore::new(dir.path().join("cache")));
        let snapshot = Snapshot::new(
            "@aiclub",
            clock.now(),
            FetchStrategy::Manual,
            vec![message_at(5, "2025-09-15 10:00:00", "hello")],
        );
        snapshots.save(&snapshot, "20250915_120000", None).await.unwrap();
        let archive = Arc::new(FsArchiveStore::new(dir.path().join("daily")));
        let service = ArchiveService::new(snapshots.clone(), archive, clock);
        Fixture {
            dir,
            snapshots,
            service,
        }
    }

    #[tokio::test]
    async fn test_archive_and_restore() {
        let f = fixture().await;
        let path = f.service.archive_latest("aiclub", None).await.unwrap();
        assert!(path.ends_with("daily/2025-09-15/aiclub.json"));

        let archived = f.service.get("@aiclub", date("2025-09-15")).await.unwrap().unwrap();
        let meta = archived.meta.archive.unwrap();
        assert_eq!(meta.archive_date, date("2025-09-15"));
        assert_eq!(meta.persistence_version, "1.0");

        let restored = f.service.restore("@aiclub", date("2025-09-15")).await.unwrap();
        assert!(restored.ends_with("cache/aiclub_20250915_000000_restored.json"));
        let back = f.snapshots.load(&restored).await.unwrap();
        assert_eq!(back.messages.len(), 1);

        let missing = f.service.restore("@aiclub", date("2025-09-01")).await;
        assert!(matches!(missing, Err(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_archive_without_cache() {
        let f = fixture().await;
        let res = f.service.archive_latest("@other", None).await;
        assert!(matches!(res, Err(DomainError::NoCache(_))));
    }

    #[tokio::test]
    async fn test_cleanup_and_stats() {
        let f = fixture().await;
        f.service.archive_latest("@aiclub", Some(date("2025-07-01"))).await.unwrap();
        f.service.archive_latest("@aiclub", Some(date("2025-09-10"))).await.unwrap();
        tokio::fs::create_dir_all(f.dir.path().join("daily/not-a-date")).await.unwrap();

        let stats = f.service.stats().await.unwrap();
        assert_eq!(stats.total_dates, 2);
        assert_eq!(stats.total_caches, 2);
        assert_eq!(stats.oldest_date, Some(date("2025-07-01")));
        assert_eq!(stats.channels, vec!["@aiclub".to_string()]);

        assert_eq!(f.service.cleanup(30).await.unwrap(), 1);
        let remaining = f.service.list(None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].date, "2025-09-10");
        assert!(f.dir.path().join("daily/not-a-date").exists());
    }
}
