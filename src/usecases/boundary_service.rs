//! Boundary and freshness validation of a cached date window, plus cache
//! expansion when the live channel has moved past the cached edges.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::entities::ExpansionDetails;
use crate::domain::reports::{BoundaryReport, FreshnessCheck};
use crate::domain::{
    ChannelRef, DateFilter, DateWindow, DomainError, ExpansionDirection, FetchStrategy, Message,
    Snapshot, ValidationStatus,
};
use crate::ports::{ChatGateway, HistoryQuery, SnapshotStore};
use crate::shared::clock::LocalClock;
use crate::usecases::filter_service::{load_latest_snapshot, select_messages};
use crate::usecases::verification::check_boundary;

pub const DEFAULT_EXPANSION_STEPS: usize = 50;
const FRESHNESS_WINDOW: usize = 10;

#[derive(Debug, Clone)]
pub struct ExpansionOutcome {
    pub path: PathBuf,
    pub snapshot: Snapshot,
    pub details: ExpansionDetails,
}

pub struct BoundaryService {
    gateway: Arc<dyn ChatGateway>,
    snapshots: Arc<dyn SnapshotStore>,
    clock: LocalClock,
}

impl BoundaryService {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        snapshots: Arc<dyn SnapshotStore>,
        clock: LocalClock,
    ) -> Self {
        Self {
            gateway,
            snapshots,
            clock,
        }
    }

    /// Validate the newest snapshot of `channel` for `filter`.
    pub async fn validate(
        &self,
        channel: &str,
        filter: &DateFilter,
    ) -> Result<(BoundaryReport, PathBuf, Snapshot), DomainError> {
        let (path, snapshot) = load_latest_snapshot(self.snapshots.as_ref(), channel).await?;
        let report = self.validate_snapshot(&snapshot, &path, filter).await?;
        Ok((report, path, snapshot))
    }

    pub async fn validate_snapshot(
        &self,
        snapshot: &Snapshot,
        path: &Path,
        filter: &DateFilter,
    ) -> Result<BoundaryReport, DomainError> {
        let window = filter.window(self.clock.now_naive());
        let channel_ref = self.gateway.resolve_channel(&snapshot.meta.channel).await?;
        let in_window = select_messages(&snapshot.messages, &window);

        let latest_msg = in_window.first();
        let earliest_msg = in_window.last();

        let latest = match latest_msg {
            Some(m) => Some(check_boundary(self.gateway.as_ref(), &channel_ref, m).await?),
            None => None,
        };
        // A single message is both boundaries; check it once.
        let earliest = match (earliest_msg, &latest) {
            (Some(m), Some(l)) if l.message_id == m.id => Some(l.clone()),
            (Some(m), _) => Some(check_boundary(self.gateway.as_ref(), &channel_ref, m).await?),
            (None, _) => None,
        };

        let forward_from = latest_msg.or(snapshot.latest()).map(|m| m.id).unwrap_or(0);
        let freshness = self
            .freshness(&channel_ref, &window, forward_from, earliest_msg.map(|m| m.id))
            .await?;

        let checks: Vec<_> = earliest.iter().chain(latest.iter()).collect();
        let (status, confidence) = if in_window.is_empty() {
            (ValidationStatus::Insufficient, 0.0)
        } else {
            let confidence =
                checks.iter().map(|c| c.confidence).sum::<f64>() / checks.len() as f64;
            let status = if freshness.expansion.is_some() {
                ValidationStatus::ExpansionRequired
            } else if checks.iter().all(|c| c.verified) {
                ValidationStatus::Verified
            } else {
                ValidationStatus::Unverified
            };
            (status, confidence)
        };

        info!(
            channel = %snapshot.meta.channel,
            filter = %filter,
            in_window = in_window.len(),
            ?status,
            confidence,
            "boundary validation done"
        );

        Ok(BoundaryReport {
            channel: snapshot.meta.channel.clone(),
            filter: filter.to_string(),
            window_start: window.start,
            window_end: window.end,
            cache_file: path.display().to_string(),
            messages_in_window: in_window.len(),
            earliest,
            latest,
            freshness,
            status,
            confidence,
        })
    }

    /// Live messages just past either cached edge that still fall inside the window.
    async fn freshness(
        &self,
        channel: &ChannelRef,
        window: &DateWindow,
        latest_id: i32,
        earliest_id: Option<i32>,
    ) -> Result<FreshnessCheck, DomainError> {
        let offset = self.clock.offset();

        let query = if latest_id > 0 {
            HistoryQuery::after(latest_id, FRESHNESS_WINDOW)
        } else {
            HistoryQuery::latest(FRESHNESS_WINDOW)
        };
        let newer = self.gateway.get_history(channel, query).await?;
        let newer_in_window = newer
            .iter()
            .rev()
            .find(|m| window.contains_utc(m.date_utc, offset))
            .map(|m| m.id);

        let older_in_window = match earliest_id {
            Some(id) => self
                .gateway
                .get_history(channel, HistoryQuery::before(id, FRESHNESS_WINDOW))
                .await?
                .iter()
                .find(|m| window.contains_utc(m.date_utc, offset))
                .map(|m| m.id),
            None => None,
        };

        let mut expansion = None;
        if newer_in_window.is_some() {
            expansion = Some(ExpansionDirection::Forward);
        }
        if older_in_window.is_some() {
            expansion = Some(ExpansionDirection::merge(expansion, ExpansionDirection::Backward));
        }
        if let Some(dir) = expansion {
            warn!(?newer_in_window, ?older_in_window, direction = %dir, "cache is stale");
        }

        Ok(FreshnessCheck {
            newer_in_window,
            older_in_window,
            expansion,
        })
    }

    /// Up to `steps` messages directly above `from`, newest first. Pages
    /// upward until enough are collected or the top of the channel is reached.
    async fn page_forward(
        &self,
        channel: &ChannelRef,
        from: Option<i32>,
        steps: usize,
    ) -> Result<Vec<Message>, DomainError> {
        let Some(mut cursor) = from else {
            return self.gateway.get_history(channel, HistoryQuery::latest(steps)).await;
        };
        let top = self
            .gateway
            .get_history(channel, HistoryQuery::latest(1))
            .await?
            .first()
            .map(|m| m.id)
            .unwrap_or(0);

        let mut collected: Vec<Message> = Vec::new();
        while collected.len() < steps && cursor < top {
            let query = HistoryQuery::after(cursor, steps - collected.len());
            collected.extend(self.gateway.get_history(channel, query).await?);
            // Deleted ids leave the page short; keep climbing past them.
            cursor = query.max_id - 1;
        }
        collected.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(collected)
    }

    /// Extend a snapshot past its edges and write the result as a new
    /// `expanded` snapshot. The source file is left untouched.
    pub async fn expand(
        &self,
        source: &Path,
        direction: ExpansionDirection,
        steps: usize,
    ) -> Result<ExpansionOutcome, DomainError> {
        let current = self.snapshots.load(source).await?;
        let channel_ref = self.gateway.resolve_channel(&current.meta.channel).await?;

        let forward: Vec<Message> = if direction.forward() {
            self.page_forward(&channel_ref, current.latest().map(|m| m.id), steps)
                .await?
        } else {
            Vec::new()
        };
        let backward: Vec<Message> = match current.earliest() {
            Some(earliest) if direction.backward() => {
                self.gateway
                    .get_history(&channel_ref, HistoryQuery::before(earliest.id, steps))
                    .await?
            }
            _ => Vec::new(),
        };

        let details = ExpansionDetails {
            direction,
            steps_requested: steps,
            messages_added: forward.len() + backward.len(),
            original_cache: source.display().to_string(),
        };

        let mut messages = forward;
        messages.extend(current.messages.iter().cloned());
        messages.extend(backward);

        let mut snapshot = Snapshot::new(
            &current.meta.channel,
            self.clock.now(),
            FetchStrategy::Expanded,
            messages,
        );
        snapshot.meta.suffix = Some("expanded".to_string());
        snapshot.meta.expansion = Some(details.clone());

        let path = self
            .snapshots
            .save(&snapshot, &self.clock.file_stamp(), Some("expanded"))
            .await?;
        info!(
            path = %path.display(),
            added = details.messages_added,
            total = snapshot.messages.len(),
            "cache expanded"
        );
        Ok(ExpansionOutcome {
            path,
            snapshot,
            details,
        })
    }
}
