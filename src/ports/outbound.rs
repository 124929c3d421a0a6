//! Outbound ports. Application calls into infrastructure.
//!
//! Implemented by adapters.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::domain::{Anchor, ChannelRef, DomainError, Message, Snapshot};

/// History window, mirroring the server's GetHistory semantics.
///
/// Results are newest first and satisfy all of:
/// - `id < offset_id` when `offset_id > 0`
/// - `id > min_id` when `min_id > 0`
/// - `id < max_id` when `max_id > 0`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    pub offset_id: i32,
    pub min_id: i32,
    pub max_id: i32,
    pub limit: usize,
}

impl HistoryQuery {
    /// Newest `limit` messages.
    pub fn latest(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    /// `limit` messages strictly older than `offset_id`.
    pub fn before(offset_id: i32, limit: usize) -> Self {
        Self {
            offset_id,
            limit,
            ..Default::default()
        }
    }

    /// Messages strictly between `min_id` and `max_id`.
    pub fn between(min_id: i32, max_id: i32, limit: usize) -> Self {
        Self {
            min_id,
            max_id,
            limit,
            ..Default::default()
        }
    }

    /// The `limit` ids directly above `min_id`.
    ///
    /// A bare `min_id` returns the newest page instead, which skips the ids
    /// next to the boundary once more than `limit` messages were posted.
    pub fn after(min_id: i32, limit: usize) -> Self {
        let span = i32::try_from(limit).unwrap_or(i32::MAX);
        Self::between(min_id, min_id.saturating_add(span).saturating_add(1), limit)
    }

    pub fn admits(&self, id: i32) -> bool {
        (self.offset_id <= 0 || id < self.offset_id)
            && (self.min_id <= 0 || id > self.min_id)
            && (self.max_id <= 0 || id < self.max_id)
    }
}

/// Telegram API gateway. Resolve channels, read history, download media.
#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    /// Resolve `@username` (or a numeric id) to a channel.
    async fn resolve_channel(&self, channel: &str) -> Result<ChannelRef, DomainError>;

    /// One history request; newest first.
    async fn get_history(
        &self,
        channel: &ChannelRef,
        query: HistoryQuery,
    ) -> Result<Vec<Message>, DomainError>;

    /// Fetch a single message by id. `None` when it does not exist (deleted).
    async fn get_message(
        &self,
        channel: &ChannelRef,
        message_id: i32,
    ) -> Result<Option<Message>, DomainError>;

    /// Download the media of a message into `dest_dir`. `None` when the message has no media.
    async fn download_media(
        &self,
        channel: &ChannelRef,
        message_id: i32,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>, DomainError>;
}

/// A snapshot file on disk, as listed by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotFile {
    pub path: PathBuf,
    /// Channel name as it appears in the file name (no `@`).
    pub channel: String,
    /// Timestamp encoded in the file name.
    pub created: NaiveDateTime,
    pub suffix: Option<String>,
    pub modified: DateTime<Utc>,
    pub size: u64,
}

/// Snapshot store. One JSON file per fetch operation.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Write a new snapshot file named after the channel, `stamp` and `suffix`.
    async fn save(
        &self,
        snapshot: &Snapshot,
        stamp: &str,
        suffix: Option<&str>,
    ) -> Result<PathBuf, DomainError>;

    /// Write a snapshot to an explicit path (corrected or restored copies).
    async fn save_as(&self, path: &Path, snapshot: &Snapshot) -> Result<(), DomainError>;

    async fn load(&self, path: &Path) -> Result<Snapshot, DomainError>;

    /// Most recently modified snapshot of the channel.
    async fn latest(&self, channel: &str) -> Result<Option<PathBuf>, DomainError>;

    /// All snapshot files, optionally restricted to one channel; newest first.
    async fn list(&self, channel: Option<&str>) -> Result<Vec<SnapshotFile>, DomainError>;

    async fn remove(&self, path: &Path) -> Result<(), DomainError>;

    /// Directory holding the snapshots.
    fn dir(&self) -> &Path;
}

/// channel (no `@`) -> date key -> anchor. Date keys are kept as written so
/// malformed entries can be found and cleaned up.
pub type AnchorMap = BTreeMap<String, BTreeMap<String, Anchor>>;

/// Anchor store. Persists temporal anchors.
#[async_trait::async_trait]
pub trait AnchorStore: Send + Sync {
    async fn get(&self, channel: &str, date: &str) -> Result<Option<Anchor>, DomainError>;

    async fn set(&self, channel: &str, anchor: Anchor) -> Result<(), DomainError>;

    async fn all(&self) -> Result<AnchorMap, DomainError>;

    async fn replace_all(&self, anchors: AnchorMap) -> Result<(), DomainError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    /// Date directory name (`YYYY-MM-DD`).
    pub date: String,
    pub channel: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Daily archive store. `daily/<date>/<channel>.json`.
#[async_trait::async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn write(
        &self,
        channel: &str,
        date: &str,
        snapshot: &Snapshot,
    ) -> Result<PathBuf, DomainError>;

    async fn read(&self, channel: &str, date: &str) -> Result<Option<Snapshot>, DomainError>;

    /// All archived files, optionally for one channel; newest date first.
    async fn list(&self, channel: Option<&str>) -> Result<Vec<ArchiveEntry>, DomainError>;

    /// Every date directory name, including malformed ones.
    async fn dates(&self) -> Result<Vec<String>, DomainError>;

    async fn remove_date(&self, date: &str) -> Result<(), DomainError>;
}

/// Report store. Verification reports as pretty JSON.
#[async_trait::async_trait]
pub trait ReportStore: Send + Sync {
    async fn save(
        &self,
        file_name: &str,
        report: &serde_json::Value,
    ) -> Result<PathBuf, DomainError>;
}
