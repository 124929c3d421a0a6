//! First message of a date, found on the live channel and triple-verified.
//!
//! Scan backward from the newest message until the date is passed, confirm
//! nothing older on the same date exists, verify the candidate by three
//! lookups, then optionally hash its media. The result is written as
//! `<channel>_<date>_boundary_report.json`.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::domain::entities::{MediaKind, clean_channel, normalize_channel};
use crate::domain::reports::{BorderComparison, FirstMessageReport};
use crate::domain::{DateWindow, DomainError, Message, Snapshot};
use crate::ports::{ChatGateway, HistoryQuery, ReportStore};
use crate::shared::clock::LocalClock;
use crate::usecases::fetch_service::{BATCH_SIZE, WINDOW_SCAN_LIMIT};
use crate::usecases::media::download_with_hash;
use crate::usecases::verification::triple_verify;

/// Older messages inspected when confirming the candidate is the first.
const CONFIRM_SCAN_LIMIT: usize = 50;

pub struct BorderValidator {
    gateway: Arc<dyn ChatGateway>,
    reports: Arc<dyn ReportStore>,
    clock: LocalClock,
    /// Download and hash media of the verified message when set.
    media_dir: Option<PathBuf>,
}

impl BorderValidator {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        reports: Arc<dyn ReportStore>,
        clock: LocalClock,
    ) -> Self {
        Self {
            gateway,
            reports,
            clock,
            media_dir: None,
        }
    }

    pub fn with_media_dir(mut self, dir: PathBuf) -> Self {
        self.media_dir = Some(dir);
        self
    }

    pub fn report_file_name(channel: &str, date: NaiveDate) -> String {
        format!("{}_{}_boundary_report.json", clean_channel(channel), date.format("%Y-%m-%d"))
    }

    pub async fn find_first_message_of_date(
        &self,
        channel: &str,
        date: NaiveDate,
    ) -> Result<(FirstMessageReport, PathBuf), DomainError> {
        let channel = normalize_channel(channel);
        let window = DateWindow::day(date);
        let offset = self.clock.offset();
        let channel_ref = self.gateway.resolve_channel(&channel).await?;

        // Broad scan, newest first.
        let mut candidate: Option<Message> = None;
        let mut messages_scanned = 0usize;
        let mut offset_id = 0;
        'scan: while messages_scanned < WINDOW_SCAN_LIMIT {
            let limit = BATCH_SIZE.min(WINDOW_SCAN_LIMIT - messages_scanned);
            let page = self
                .gateway
                .get_history(&channel_ref, HistoryQuery::before(offset_id, limit))
                .await?;
            let Some(oldest) = page.last() else {
                break;
            };
            offset_id = oldest.id;
            for m in page {
                messages_scanned += 1;
                let at = m.date_utc.with_timezone(&offset).naive_local();
                if window.is_before_start(at) {
                    break 'scan;
                }
                if window.contains(at) {
                    candidate = Some(m);
                }
            }
        }

        let Some(mut first) = candidate else {
            info!(channel = %channel, %date, messages_scanned, "no messages on date");
            let report = FirstMessageReport {
                channel: channel.clone(),
                date,
                generated_at: self.clock.now(),
                messages_scanned,
                first_message: None,
                earlier_in_date_found: false,
                verification: None,
            };
            let path = self.save_report(&channel, date, &report).await?;
            return Ok((report, path));
        };

        // Confirm nothing older on the same date.
        let mut earlier_in_date_found = false;
        let older = self
            .gateway
            .get_history(&channel_ref, HistoryQuery::before(first.id, CONFIRM_SCAN_LIMIT))
            .await?;
        for m in older {
            if !window.contains_utc(m.date_utc, offset) {
                break;
            }
            warn!(candidate = first.id, earlier = m.id, "earlier message on the same date");
            earlier_in_date_found = true;
            first = m;
        }

        let mut verification = triple_verify(self.gateway.as_ref(), &channel_ref, first.id).await?;
        if let Some(live) = verification.message.as_mut() {
            if let (Some(dir), Some(_)) = (&self.media_dir, MediaKind::from_marked_text(&live.text)) {
                live.media_info =
                    download_with_hash(self.gateway.as_ref(), &channel_ref, live.id, dir, &self.clock)
                        .await;
            }
        }
        let first_message = verification.message.clone().or(Some(first));

        info!(
            channel = %channel,
            %date,
            first_id = first_message.as_ref().map(|m| m.id),
            score = verification.verification_score,
            earlier_in_date_found,
            "first message of date"
        );

        let report = FirstMessageReport {
            channel: channel.clone(),
            date,
            generated_at: self.clock.now(),
            messages_scanned,
            first_message,
            earlier_in_date_found,
            verification: Some(verification),
        };
        let path = self.save_report(&channel, date, &report).await?;
        Ok((report, path))
    }

    async fn save_report(
        &self,
        channel: &str,
        date: NaiveDate,
        report: &FirstMessageReport,
    ) -> Result<PathBuf, DomainError> {
        let value = serde_json::to_value(report).map_err(|e| DomainError::Report(e.to_string()))?;
        self.reports
            .save(&Self::report_file_name(channel, date), &value)
            .await
    }

    /// Compare the cached first message of `date` with the live one.
    pub async fn compare(
        &self,
        snapshot: &Snapshot,
        date: NaiveDate,
    ) -> Result<(BorderComparison, FirstMessageReport), DomainError> {
        let cached_first_id = validate_cached_boundary(snapshot, date).map(|m| m.id);
        let (live, _) = self
            .find_first_message_of_date(&snapshot.meta.channel, date)
            .await?;
        let live_first_id = live.first_message.as_ref().map(|m| m.id);
        let comparison = BorderComparison {
            channel: snapshot.meta.channel.clone(),
            date,
            cached_first_id,
            live_first_id,
            matches: cached_first_id.is_some() && cached_first_id == live_first_id,
        };
        if !comparison.matches {
            warn!(?cached_first_id, ?live_first_id, "cached border differs from live");
        }
        Ok((comparison, live))
    }
}

/// Chronologically first cached message on `date`.
pub fn validate_cached_boundary(snapshot: &Snapshot, date: NaiveDate) -> Option<&Message> {
    let window = DateWindow::day(date);
    snapshot
        .messages
        .iter()
        .filter(|m| window.contains_message(m))
        .min_by(|a, b| a.date_msk.cmp(&b.date_msk).then(a.id.cmp(&b.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockGateway, message_at};
    use crate::adapters::persistence::FsReportStore;
    use crate::domain::FetchStrategy;
    use crate::domain::reports::TripleStatus;
    use crate::domain::{ValidationReport, ValidationStatus};
    use chrono::FixedOffset;

    fn clock() -> LocalClock {
        LocalClock::fixed(
            "2025-09-15T09:30:00Z".parse().unwrap(),
            FixedOffset::east_opt(3 * 3600).unwrap(),
        )
    }

    fn live() -> Vec<Message> {
        vec![
            message_at(30, "2025-09-15 09:00:00", "today"),
            message_at(29, "2025-09-14 21:00:00", "evening"),
            message_at(28, "2025-09-14 12:00:00", "📷 [Photo] noon"),
            message_at(27, "2025-09-14 00:05:00", "first"),
            message_at(26, "2025-09-13 23:50:00", "previous day"),
            message_at(25, "2025-09-13 20:00:00", "previous day"),
        ]
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn validator(dir: &std::path::Path, gw: Arc<MockGateway>) -> BorderValidator {
        BorderValidator::new(gw, Arc::new(FsReportStore::new(dir)), clock())
    }

    #[tokio::test]
    async fn test_find_first_message_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let gw = Arc::new(MockGateway::new("@aiclub", live()));
        let v = validator(dir.path(), gw);

        let (report, path) = v
            .find_first_message_of_date("aiclub", date("2025-09-14"))
            .await
            .unwrap();
        assert_eq!(report.first_message.as_ref().unwrap().id, 27);
        assert!(!report.earlier_in_date_found);
        assert_eq!(report.verification.as_ref().unwrap().status, TripleStatus::Verified);
        assert!(path.ends_with("aiclub_2025-09-14_boundary_report.json"));
        assert!(ValidationReport::from(&report).passed());
    }

    #[tokio::test]
    async fn test_no_messages_on_date() {
        let dir = tempfile::tempdir().unwrap();
        let gw = Arc::new(MockGateway::new("@aiclub", live()));
        let v = validator(dir.path(), gw);
        let (report, _) = v
            .find_first_message_of_date("@aiclub", date("2025-09-10"))
            .await
            .unwrap();
        assert!(report.first_message.is_none());
        assert_eq!(ValidationReport::from(&report).status, ValidationStatus::Insufficient);
    }

    #[tokio::test]
    async fn test_media_is_hashed() {
        let dir = tempfile::tempdir().unwrap();
        let mut messages = live();
        messages.retain(|m| m.id != 27);
        let gw = Arc::new(MockGateway::new("@aiclub", messages));
        gw.set_media(28, b"image".to_vec());
        let v = validator(dir.path(), gw).with_media_dir(dir.path().join("media"));

        let (report, _) = v
            .find_first_message_of_date("@aiclub", date("2025-09-14"))
            .await
            .unwrap();
        let first = report.first_message.unwrap();
        assert_eq!(first.id, 28);
        assert_eq!(first.media_info.unwrap().file_size, 5);
    }

    #[tokio::test]
    async fn test_compare_detects_missing_border() {
        let dir = tempfile::tempdir().unwrap();
        let gw = Arc::new(MockGateway::new("@aiclub", live()));
        let v = validator(dir.path(), gw);

        // Cache lacks message 27.
        let cached: Vec<Message> = live().into_iter().filter(|m| m.id != 27).collect();
        let snapshot = Snapshot::new("@aiclub", clock().now(), FetchStrategy::Manual, cached);
        let (cmp, _) = v.compare(&snapshot, date("2025-09-14")).await.unwrap();
        assert_eq!(cmp.cached_first_id, Some(28));
        assert_eq!(cmp.live_first_id, Some(27));
        assert!(!cmp.matches);

        let full = Snapshot::new("@aiclub", clock().now(), FetchStrategy::Manual, live());
        let (cmp, _) = v.compare(&full, date("2025-09-14")).await.unwrap();
        assert!(cmp.matches);
    }
}
