//! Fetch logic: pick an offset -> read history -> write a new snapshot.
//!
//! - Offsets come from an explicit id or from temporal anchors
//! - Large fetches page backward in 100-message batches
//! - Window fetches page backward until the window start is passed
//! - Errors are returned as-is; nothing is retried here

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::domain::entities::{normalize_channel, TimeRangeMeta};
use crate::domain::{
    Anchor, DateFilter, DomainError, FetchOffset, FetchStrategy, Message, Snapshot,
};
use crate::ports::{ChatGateway, HistoryQuery, SnapshotStore};
use crate::shared::clock::LocalClock;
use crate::usecases::anchor_service::AnchorService;

/// Telegram's per-request maximum.
pub const BATCH_SIZE: usize = 100;
/// Window scans stop after this many messages even if the start was not reached.
pub const WINDOW_SCAN_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub channel: String,
    pub limit: usize,
    /// 0 = let anchors (or the latest message) decide.
    pub offset_id: i32,
    pub suffix: Option<String>,
    pub use_anchor: bool,
}

impl FetchRequest {
    pub fn latest(channel: &str, limit: usize) -> Self {
        Self {
            channel: channel.to_string(),
            limit,
            offset_id: 0,
            suffix: None,
            use_anchor: false,
        }
    }
}

/// Result of one fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub path: PathBuf,
    pub snapshot: Snapshot,
    pub offset: Option<FetchOffset>,
    pub anchor_updated: Option<Anchor>,
}

pub struct FetchService {
    gateway: Arc<dyn ChatGateway>,
    snapshots: Arc<dyn SnapshotStore>,
    anchors: Arc<AnchorService>,
    clock: LocalClock,
    /// Pause between paged requests.
    batch_delay: Duration,
}

impl FetchService {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        snapshots: Arc<dyn SnapshotStore>,
        anchors: Arc<AnchorService>,
        clock: LocalClock,
        batch_delay: Duration,
    ) -> Self {
        Self {
            gateway,
            snapshots,
            anchors,
            clock,
            batch_delay,
        }
    }

    async fn choose_offset(&self, req: &FetchRequest) -> Result<FetchOffset, DomainError> {
        if req.offset_id != 0 {
            return Ok(FetchOffset {
                strategy: FetchStrategy::Manual,
                offset_id: req.offset_id,
                reason: format!("Explicit offset {}", req.offset_id),
                anchor: None,
            });
        }
        if req.use_anchor {
            return self
                .anchors
                .calculate_fetch_offset(&req.channel, self.clock.today())
                .await;
        }
        Ok(FetchOffset {
            strategy: FetchStrategy::Manual,
            offset_id: 0,
            reason: "Anchoring disabled, fetching latest".to_string(),
            anchor: None,
        })
    }

    /// One history request, written as a new snapshot.
    pub async fn fetch_and_cache(&self, req: &FetchRequest) -> Result<FetchOutcome, DomainError> {
        let channel = normalize_channel(&req.channel);
        let offset = self.choose_offset(req).await?;
        info!(
            channel = %channel,
            strategy = %offset.strategy,
            offset_id = offset.offset_id,
            reason = %offset.reason,
            "fetch offset chosen"
        );

        let channel_ref = self.gateway.resolve_channel(&channel).await?;
        let messages = self
            .gateway
            .get_history(&channel_ref, HistoryQuery::before(offset.offset_id, req.limit))
            .await?;

        let mut snapshot = Snapshot::new(&channel, self.clock.now(), offset.strategy, messages);
        snapshot.meta.limit_requested = Some(req.limit);
        snapshot.meta.offset_id = offset.offset_id;
        snapshot.meta.original_offset_id = req.offset_id;
        snapshot.meta.suffix = req.suffix.clone().filter(|s| !s.is_empty());

        let path = self
            .snapshots
            .save(&snapshot, &self.clock.file_stamp(), req.suffix.as_deref())
            .await?;

        let anchor_updated = if req.use_anchor && !snapshot.messages.is_empty() {
            self.anchors
                .update_from_messages(&channel, &snapshot.messages, self.clock.today())
                .await?
        } else {
            None
        };

        info!(channel = %channel, count = snapshot.messages.len(), "cached messages");
        Ok(FetchOutcome {
            path,
            snapshot,
            offset: Some(offset),
            anchor_updated,
        })
    }

    /// Page backward in 100-message batches until `total_limit`, an empty or a short batch.
    pub async fn fetch_large(
        &self,
        channel: &str,
        total_limit: usize,
    ) -> Result<FetchOutcome, DomainError> {
        let channel = normalize_channel(channel);
        let channel_ref = self.gateway.resolve_channel(&channel).await?;

        let mut all: Vec<Message> = Vec::new();
        let mut offset_id = 0;
        while all.len() < total_limit {
            let current_limit = BATCH_SIZE.min(total_limit - all.len());
            let batch = self
                .gateway
                .get_history(&channel_ref, HistoryQuery::before(offset_id, current_limit))
                .await?;
            let Some(oldest) = batch.last() else {
                debug!(total = all.len(), "no more messages");
                break;
            };
            offset_id = oldest.id;
            let short = batch.len() < current_limit;
            all.extend(batch);
            debug!(total = all.len(), "fetched batch");
            if short {
                break;
            }
            self.pause().await;
        }

        let mut snapshot = Snapshot::new(&channel, self.clock.now(), FetchStrategy::LargeBatch, all);
        snapshot.meta.limit_requested = Some(total_limit);
        snapshot.meta.suffix = Some("large".to_string());
        let path = self
            .snapshots
            .save(&snapshot, &self.clock.file_stamp(), Some("large"))
            .await?;
        info!(channel = %channel, count = snapshot.messages.len(), "large fetch cached");
        Ok(FetchOutcome {
            path,
            snapshot,
            offset: None,
            anchor_updated: None,
        })
    }

    /// Scan backward until a message older than the window start appears
    /// (or the scan limit is hit), keeping only in-window messages.
    pub async fn fetch_window(
        &self,
        channel: &str,
        filter: &DateFilter,
        batch: usize,
    ) -> Result<FetchOutcome, DomainError> {
        let channel = normalize_channel(channel);
        let window = filter.window(self.clock.now_naive());
        let channel_ref = self.gateway.resolve_channel(&channel).await?;

        let mut kept: Vec<Message> = Vec::new();
        let mut offset_id = 0;
        let mut total_scanned = 0usize;
        let mut scan_completed = false;

        loop {
            let page = self
                .gateway
                .get_history(&channel_ref, HistoryQuery::before(offset_id, batch))
                .await?;
            let Some(oldest) = page.last() else {
                break;
            };
            offset_id = oldest.id;
            total_scanned += page.len();

            for m in page {
                let Some(at) = m.local_datetime() else {
                    continue;
                };
                if window.is_before_start(at) {
                    scan_completed = true;
                    break;
                }
                if window.contains(at) {
                    kept.push(m);
                }
            }

            if scan_completed {
                break;
            }
            if total_scanned >= WINDOW_SCAN_LIMIT {
                info!(total_scanned, "safety limit reached, stopping scan");
                break;
            }
            self.pause().await;
        }

        let mut snapshot = Snapshot::new(&channel, self.clock.now(), FetchStrategy::TimeRange, kept);
        snapshot.meta.time_range = Some(TimeRangeMeta {
            filter: filter.to_string(),
            start: window.start,
            end: window.end,
            scan_completed,
            total_scanned,
        });
        let path = self
            .snapshots
            .save(&snapshot, &self.clock.file_stamp(), None)
            .await?;
        info!(
            channel = %channel,
            count = snapshot.messages.len(),
            total_scanned,
            scan_completed,
            "window fetch cached"
        );
        Ok(FetchOutcome {
            path,
            snapshot,
            offset: None,
            anchor_updated: None,
        })
    }

    async fn pause(&self) {
        if !self.batch_delay.is_zero() {
            tokio::time::sleep(self.batch_delay).await;
        }
    }
}
