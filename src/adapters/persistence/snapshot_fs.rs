//! Implements SnapshotStore. One pretty JSON file per fetch in a flat directory:
//! `<channel>_<YYYYMMDD_HHMMSS>[_<suffix>].json`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use tokio::fs;
use tracing::{debug, info};

use super::json_file::{read_json, write_json_atomic};
use crate::domain::entities::clean_channel;
use crate::domain::{DomainError, Snapshot};
use crate::ports::{SnapshotFile, SnapshotStore};

/// `<channel>_<YYYYMMDD>_<HHMMSS>` followed by an optional `_suffix` or `.corrected`.
static SNAPSHOT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<channel>.+?)_(?P<ts>\d{8}_\d{6})(?:[_.](?P<suffix>.+))?$")
        .expect("Invalid snapshot name regex")
});

/// Split a snapshot file name into (channel, timestamp, suffix).
pub fn parse_snapshot_name(file_name: &str) -> Option<(String, NaiveDateTime, Option<String>)> {
    let stem = file_name.strip_suffix(".json")?;
    let caps = SNAPSHOT_NAME.captures(stem)?;
    let created = NaiveDateTime::parse_from_str(&caps["ts"], "%Y%m%d_%H%M%S").ok()?;
    Some((
        caps["channel"].to_string(),
        created,
        caps.name("suffix").map(|s| s.as_str().to_string()),
    ))
}

pub fn snapshot_file_name(channel: &str, stamp: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(s) if !s.is_empty() => format!("{}_{}_{}.json", clean_channel(channel), stamp, s),
        _ => format!("{}_{}.json", clean_channel(channel), stamp),
    }
}

/// File-system snapshot store.
pub struct FsSnapshotStore {
    base_dir: PathBuf,
}

impl FsSnapshotStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl SnapshotStore for FsSnapshotStore {
    async fn save(
        &self,
        snapshot: &Snapshot,
        stamp: &str,
        suffix: Option<&str>,
    ) -> Result<PathBuf, DomainError> {
        let path = self
            .base_dir
            .join(snapshot_file_name(&snapshot.meta.channel, stamp, suffix));
        write_json_atomic(&path, snapshot, DomainError::Store).await?;
        info!(
            path = %path.display(),
            channel = %snapshot.meta.channel,
            count = snapshot.messages.len(),
            "saved snapshot"
        );
        Ok(path)
    }

    async fn save_as(&self, path: &Path, snapshot: &Snapshot) -> Result<(), DomainError> {
        write_json_atomic(path, snapshot, DomainError::Store).await?;
        info!(path = %path.display(), count = snapshot.messages.len(), "saved snapshot copy");
        Ok(())
    }

    async fn load(&self, path: &Path) -> Result<Snapshot, DomainError> {
        read_json(path, DomainError::Store)
            .await?
            .ok_or_else(|| DomainError::NotFound(path.display().to_string()))
    }

    async fn latest(&self, channel: &str) -> Result<Option<PathBuf>, DomainError> {
        Ok(self
            .list(Some(channel))
            .await?
            .into_iter()
            .next()
            .map(|f| f.path))
    }

    async fn list(&self, channel: Option<&str>) -> Result<Vec<SnapshotFile>, DomainError> {
        let wanted = channel.map(clean_channel);
        let mut entries = match fs::read_dir(&self.base_dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DomainError::Store(e.to_string())),
        };

        let mut out = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some((file_channel, created, suffix)) = parse_snapshot_name(&name) else {
                continue;
            };
            if wanted.as_ref().is_some_and(|w| *w != file_channel) {
                continue;
            }
            let meta = entry
                .metadata()
                .await
                .map_err(|e| DomainError::Store(e.to_string()))?;
            if !meta.is_file() {
                continue;
            }
            let modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_default();
            out.push(SnapshotFile {
                path: entry.path(),
                channel: file_channel,
                created,
                suffix,
                modified,
                size: meta.len(),
            });
        }
        // Newest first; ties broken by the timestamp in the name.
        out.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.created.cmp(&a.created))
                .then_with(|| b.path.cmp(&a.path))
        });
        debug!(count = out.len(), "listed snapshots");
        Ok(out)
    }

    async fn remove(&self, path: &Path) -> Result<(), DomainError> {
        fs::remove_file(path)
            .await
            .map_err(|e| DomainError::Store(format!("remove {}: {}", path.display(), e)))
    }

    fn dir(&self) -> &Path {
        &self.base_dir
    }
}
