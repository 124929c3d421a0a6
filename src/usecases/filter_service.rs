//! Filter and export cached messages.
//!
//! Reads the newest snapshot of a channel, applies a date selector, an
//! optional case-insensitive pattern and a limit. Single-date selectors also
//! get a border check: the messages just older than the first match must
//! belong to an earlier date.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::entities::normalize_channel;
use crate::domain::reports::BorderCheck;
use crate::domain::{DateFilter, DateWindow, DomainError, Message, Snapshot};
use crate::ports::SnapshotStore;
use crate::shared::clock::LocalClock;
use crate::usecases::fetch_service::{FetchRequest, FetchService};

/// Fewest older messages needed before the border can be judged.
pub const BORDER_MIN_CHECK: usize = 3;
/// Most older messages inspected by the border check.
pub const BORDER_MAX_CHECK: usize = 7;
/// Lower bound on the auto-fetch size.
const AUTO_FETCH_MIN_LIMIT: usize = 500;

#[derive(Debug, Clone)]
pub struct FilterQuery {
    pub filter: DateFilter,
    pub pattern: Option<String>,
    pub limit: Option<usize>,
}

impl FilterQuery {
    pub fn new(filter: DateFilter) -> Self {
        Self {
            filter,
            pattern: None,
            limit: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterResult {
    pub cache_file: PathBuf,
    pub total_cached: usize,
    /// Source order (newest first).
    pub messages: Vec<Message>,
    pub border: BorderCheck,
    /// Auto-fetches performed to complete the border check.
    pub refetches: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

/// Chronological summary of an exported range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeSummary {
    pub total: usize,
    pub first_message: Option<Message>,
    pub last_message: Option<Message>,
    pub time_range: Option<TimeRange>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportMeta {
    pub channel: String,
    pub filter: String,
    pub exported_at: DateTime<FixedOffset>,
    pub total_messages: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportDocument {
    pub meta: ExportMeta,
    pub messages: Vec<Message>,
}

pub struct FilterService {
    snapshots: Arc<dyn SnapshotStore>,
    clock: LocalClock,
    /// When set, an incomplete border triggers a bigger fetch.
    fetcher: Option<Arc<FetchService>>,
    max_retries: u32,
}

/// Newest snapshot of `channel`. A missing or unreadable file is `NoCache`.
pub async fn load_latest_snapshot(
    snapshots: &dyn SnapshotStore,
    channel: &str,
) -> Result<(PathBuf, Snapshot), DomainError> {
    let channel = normalize_channel(channel);
    let path = snapshots
        .latest(&channel)
        .await?
        .ok_or_else(|| DomainError::NoCache(channel.clone()))?;
    let snapshot = snapshots.load(&path).await.map_err(|e| {
        warn!(path = %path.display(), error = %e, "latest snapshot is unreadable");
        DomainError::NoCache(channel.clone())
    })?;
    debug!(path = %path.display(), count = snapshot.messages.len(), "loaded snapshot");
    Ok((path, snapshot))
}

impl FilterService {
    pub fn new(snapshots: Arc<dyn SnapshotStore>, clock: LocalClock) -> Self {
        Self {
            snapshots,
            clock,
            fetcher: None,
            max_retries: 0,
        }
    }

    pub fn with_auto_fetch(mut self, fetcher: Arc<FetchService>, max_retries: u32) -> Self {
        self.fetcher = Some(fetcher);
        self.max_retries = max_retries;
        self
    }

    /// Newest snapshot of `channel`, or `NoCache`.
    pub async fn load_latest(&self, channel: &str) -> Result<(PathBuf, Snapshot), DomainError> {
        load_latest_snapshot(self.snapshots.as_ref(), channel).await
    }

    pub async fn filter(
        &self,
        channel: &str,
        query: &FilterQuery,
    ) -> Result<FilterResult, DomainError> {
        let pattern = query.pattern.as_deref().map(compile_pattern).transpose()?;
        let window = query.filter.window(self.clock.now_naive());
        let target = query.filter.target_date(self.clock.today());

        let mut refetches = 0;
        loop {
            let (cache_file, snapshot) = self.load_latest(channel).await?;
            let in_window = select_messages(&snapshot.messages, &window);

            let border = match target {
                Some(date) if !in_window.is_empty() => {
                    check_border(&snapshot.messages, &in_window, date)
                }
                _ => BorderCheck::Skipped,
            };

            if let BorderCheck::Incomplete { available } = border {
                match &self.fetcher {
                    Some(fetcher) if refetches < self.max_retries => {
                        refetches += 1;
                        let needed = BORDER_MIN_CHECK - available;
                        let limit = AUTO_FETCH_MIN_LIMIT.max(snapshot.messages.len() + needed + 100);
                        info!(
                            channel,
                            available,
                            limit,
                            attempt = refetches,
                            "border check incomplete, fetching more history"
                        );
                        fetcher
                            .fetch_and_cache(&FetchRequest::latest(channel, limit))
                            .await?;
                        continue;
                    }
                    _ => warn!(channel, available, "border check incomplete"),
                }
            }

            let mut messages: Vec<Message> = match &pattern {
                Some(re) => in_window.into_iter().filter(|m| re.is_match(&m.text)).collect(),
                None => in_window,
            };
            if let Some(limit) = query.limit {
                messages.truncate(limit);
            }

            info!(
                channel,
                filter = %query.filter,
                matched = messages.len(),
                total = snapshot.messages.len(),
                "filtered cache"
            );
            return Ok(FilterResult {
                cache_file,
                total_cached: snapshot.messages.len(),
                messages,
                border,
                refetches,
            });
        }
    }

    /// Full export document for already filtered messages.
    pub fn export_full(
        &self,
        channel: &str,
        filter: &DateFilter,
        messages: Vec<Message>,
    ) -> ExportDocument {
        ExportDocument {
            meta: ExportMeta {
                channel: normalize_channel(channel),
                filter: filter.to_string(),
                exported_at: self.clock.now(),
                total_messages: messages.len(),
            },
            messages,
        }
    }
}

pub fn compile_pattern(pattern: &str) -> Result<Regex, DomainError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| DomainError::InvalidPattern(e.to_string()))
}

/// Messages inside `window`, source order kept.
pub fn select_messages(messages: &[Message], window: &DateWindow) -> Vec<Message> {
    messages
        .iter()
        .filter(|m| window.contains_message(m))
        .cloned()
        .collect()
}

/// Inspect up to [`BORDER_MAX_CHECK`] messages older than the earliest
/// filtered one. `messages` and `filtered` are newest first.
pub fn check_border(messages: &[Message], filtered: &[Message], target: NaiveDate) -> BorderCheck {
    let Some(first) = filtered.last() else {
        return BorderCheck::Skipped;
    };
    let Some(idx) = messages.iter().position(|m| m.id == first.id) else {
        return BorderCheck::Skipped;
    };

    let available = messages.len() - idx - 1;
    if available < BORDER_MIN_CHECK {
        return BorderCheck::Incomplete { available };
    }

    let checked = available.min(BORDER_MAX_CHECK);
    let issues: Vec<i32> = messages[idx + 1..idx + 1 + checked]
        .iter()
        .filter(|m| m.is_on(target))
        .map(|m| m.id)
        .collect();
    if issues.is_empty() {
        BorderCheck::Confirmed { checked }
    } else {
        BorderCheck::Failed { issues, checked }
    }
}

pub fn export_summary(messages: &[Message]) -> RangeSummary {
    let mut sorted: Vec<&Message> = messages.iter().collect();
    sorted.sort_by(|a, b| a.date_msk.cmp(&b.date_msk));

    let first = sorted.first().map(|m| (*m).clone());
    let last = sorted.last().map(|m| (*m).clone());
    let time_range = match (&first, &last) {
        (Some(f), Some(l)) => Some(TimeRange {
            start: f.date_msk.clone(),
            end: l.date_msk.clone(),
        }),
        _ => None,
    };
    RangeSummary {
        total: messages.len(),
        first_message: first,
        last_message: last,
        time_range,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockGateway, message_at};
    use crate::adapters::persistence::{AnchorsJson, FsSnapshotStore};
    use crate::domain::FetchStrategy;
    use crate::usecases::anchor_service::AnchorService;
    use chrono::FixedOffset;
    use std::time::Duration;

    fn clock() -> LocalClock {
        // 2025-09-15 12:30 local
        LocalClock::fixed(
            "2025-09-15T09:30:00Z".parse().unwrap(),
            FixedOffset::east_opt(3 * 3600).unwrap(),
        )
    }

    async fn store_with(dir: &std::path::Path, messages: Vec<Message>) -> Arc<FsSnapshotStore> {
        let store = Arc::new(FsSnapshotStore::new(dir));
        let snapshot = Snapshot::new("@aiclub", clock().now(), FetchStrategy::Manual, messages);
        store.save(&snapshot, "20250915_090000", None).await.unwrap();
        store
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[tokio::test]
    async fn test_date_selector_is_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let messages = vec![
            message_at(12, "2025-09-15 00:10:00", "after midnight"),
            message_at(11, "2025-09-14 22:30:00", "late"),
            message_at(10, "2025-09-14 08:00:00", "morning"),
            message_at(9, "2025-09-13 23:59:59", "day before"),
        ];
        let service = FilterService::new(store_with(dir.path(), messages).await, clock());

        let by_date = service
            .filter("aiclub", &FilterQuery::new(DateFilter::Date(date("2025-09-14"))))
            .await
            .unwrap();
        let ids: Vec<i32> = by_date.messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![11, 10]);

        let today = service
            .filter("aiclub", &FilterQuery::new(DateFilter::Today))
            .await
            .unwrap();
        let ids: Vec<i32> = today.messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![12]);
    }

    #[tokio::test]
    async fn test_pattern_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let messages = vec![
            message_at(4, "2025-09-15 10:00:00", "GPT release notes"),
            message_at(3, "2025-09-15 09:00:00", "weekly digest"),
            message_at(2, "2025-09-15 08:00:00", "gpt tips"),
            message_at(1, "2025-09-15 07:00:00", "gpt again"),
        ];
        let service = FilterService::new(store_with(dir.path(), messages).await, clock());
        let query = FilterQuery {
            filter: DateFilter::All,
            pattern: Some("gpt".into()),
            limit: Some(2),
        };
        let result = service.filter("@aiclub", &query).await.unwrap();
        let ids: Vec<i32> = result.messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![4, 2]);
        assert_eq!(result.total_cached, 4);
        assert_eq!(result.border, BorderCheck::Skipped);
    }

    #[tokio::test]
    async fn test_missing_cache_and_bad_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let service = FilterService::new(Arc::new(FsSnapshotStore::new(dir.path())), clock());
        let res = service.filter("@nobody", &FilterQuery::new(DateFilter::All)).await;
        assert!(matches!(res, Err(DomainError::NoCache(c)) if c == "@nobody"));

        let query = FilterQuery {
            filter: DateFilter::All,
            pattern: Some("(".into()),
            limit: None,
        };
        let res = service.filter("@nobody", &query).await;
        assert!(matches!(res, Err(DomainError::InvalidPattern(_))));
    }

    #[tokio::test]
    async fn test_corrupt_latest_snapshot_is_no_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(dir.path(), vec![message_at(1, "2025-09-15 10:00:00", "ok")]).await;
        tokio::fs::write(dir.path().join("aiclub_20250915_120000.json"), "[")
            .await
            .unwrap();
        let service = FilterService::new(store, clock());

        let res = service.load_latest("@aiclub").await;
        assert!(matches!(res, Err(DomainError::NoCache(c)) if c == "@aiclub"));
        let res = service.filter("aiclub", &FilterQuery::new(DateFilter::All)).await;
        assert!(matches!(res, Err(DomainError::NoCache(_))));
    }

    #[test]
    fn test_check_border() {
        let target = date("2025-09-15");
        let mut messages = vec![
            message_at(10, "2025-09-15 09:00:00", "a"),
            message_at(9, "2025-09-15 01:00:00", "b"),
        ];
        for (i, id) in (1..=8).rev().enumerate() {
            messages.push(message_at(id, &format!("2025-09-14 2{}:00:00", 3 - i.min(3)), "old"));
        }
        let filtered = messages[..2].to_vec();
        assert_eq!(
            check_border(&messages, &filtered, target),
            BorderCheck::Confirmed { checked: 7 }
        );

        // The real first message of the day was left out.
        let partial = messages[..1].to_vec();
        assert_eq!(
            check_border(&messages, &partial, target),
            BorderCheck::Failed {
                issues: vec![9],
                checked: 7
            }
        );

        let short = messages[..4].to_vec();
        assert_eq!(
            check_border(&short, &filtered, target),
            BorderCheck::Incomplete { available: 2 }
        );
    }

    #[tokio::test]
    async fn test_incomplete_border_fetches_once() {
        let dir = tempfile::tempdir().unwrap();
        let live: Vec<Message> = vec![
            message_at(6, "2025-09-15 11:00:00", "today"),
            message_at(5, "2025-09-15 08:00:00", "today"),
            message_at(4, "2025-09-14 20:00:00", "old"),
            message_at(3, "2025-09-14 19:00:00", "old"),
            message_at(2, "2025-09-14 18:00:00", "old"),
            message_at(1, "2025-09-14 17:00:00", "old"),
        ];
        let cached = live[..3].to_vec();
        let snapshots = store_with(dir.path(), cached).await;

        let gateway = Arc::new(MockGateway::new("@aiclub", live));
        let anchors = AnchorsJson::new(dir.path().join("anchors.json"));
        let fetcher = Arc::new(FetchService::new(
            gateway.clone(),
            snapshots.clone(),
            Arc::new(AnchorService::new(Arc::new(anchors), clock())),
            clock(),
            Duration::ZERO,
        ));
        let service = FilterService::new(snapshots, clock()).with_auto_fetch(fetcher, 1);

        let result = service
            .filter("@aiclub", &FilterQuery::new(DateFilter::Today))
            .await
            .unwrap();
        assert_eq!(result.refetches, 1);
        assert_eq!(result.total_cached, 6);
        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.border, BorderCheck::Confirmed { checked: 4 });
        assert_eq!(gateway.history_calls(), 1);
    }

    #[tokio::test]
    async fn test_incomplete_border_without_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        let messages = vec![message_at(2, "2025-09-15 10:00:00", "today")];
        let service = FilterService::new(store_with(dir.path(), messages).await, clock());
        let result = service
            .filter("@aiclub", &FilterQuery::new(DateFilter::Today))
            .await
            .unwrap();
        assert_eq!(result.border, BorderCheck::Incomplete { available: 0 });
        assert_eq!(result.refetches, 0);
    }

    #[test]
    fn test_export_summary_is_chronological() {
        let messages = vec![
            message_at(3, "2025-09-15 10:00:00", "c"),
            message_at(1, "2025-09-15 08:00:00", "a"),
            message_at(2, "2025-09-15 09:00:00", "b"),
        ];
        let summary = export_summary(&messages);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.first_message.unwrap().id, 1);
        assert_eq!(summary.last_message.unwrap().id, 3);
        assert_eq!(summary.time_range.unwrap().start, "2025-09-15 08:00:00");

        let empty = export_summary(&[]);
        assert_eq!(empty.total, 0);
        assert!(empty.first_message.is_none());
        assert!(empty.time_range.is_none());
    }
}
