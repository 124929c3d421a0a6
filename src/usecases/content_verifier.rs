//! Re-fetch a sample of cached messages and compare them with the live channel.
//!
//! A message passes when its UTC date and its text (media markers stripped)
//! match. Attached media files are checked against their stored SHA-256.
//! A cache passes when at least 90% of the sample does.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::entities::{CorrectionMeta, MediaInfo, clean_channel, strip_media_markers};
use crate::domain::reports::{
    ContentVerificationReport, Discrepancy, DiscrepancyKind, LiveValues, MediaStatus,
    MediaVerification, MessageVerification,
};
use crate::domain::{ChannelRef, DomainError, Message};
use crate::ports::{ChatGateway, ReportStore, SnapshotStore};
use crate::shared::clock::LocalClock;
use crate::usecases::media::hash_file;

pub const PASS_RATE: f64 = 0.9;
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct VerifyOptions {
    pub sample_size: usize,
    pub verify_media: bool,
    /// Count a views difference as a failure.
    pub require_views_match: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            verify_media: true,
            require_views_match: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorrectionOutcome {
    pub path: PathBuf,
    pub corrections_applied: usize,
}

/// Every message when there are at most `n`, else every `len / n`-th one, up to `n`.
pub fn sample_messages(messages: &[Message], n: usize) -> Vec<&Message> {
    if n == 0 {
        return Vec::new();
    }
    if messages.len() <= n {
        return messages.iter().collect();
    }
    let step = messages.len() / n;
    messages.iter().step_by(step).take(n).collect()
}

/// `x.json` -> `x.corrected.json`.
pub fn corrected_path(source: &Path) -> PathBuf {
    source.with_extension("corrected.json")
}

pub async fn verify_media_file(media: &MediaInfo) -> MediaVerification {
    let path = Path::new(&media.file_path);
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return MediaVerification {
            status: MediaStatus::FileMissing,
            expected_hash: Some(media.content_hash.clone()).filter(|h| !h.is_empty()),
            actual_hash: None,
        };
    }
    if media.content_hash.is_empty() {
        return MediaVerification {
            status: MediaStatus::NoHash,
            expected_hash: None,
            actual_hash: None,
        };
    }
    let actual = match hash_file(path).await {
        Ok(h) => h,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot hash media file");
            return MediaVerification {
                status: MediaStatus::FileMissing,
                expected_hash: Some(media.content_hash.clone()),
                actual_hash: None,
            };
        }
    };
    let status = if actual == media.content_hash {
        MediaStatus::Verified
    } else {
        MediaStatus::HashMismatch
    };
    MediaVerification {
        status,
        expected_hash: Some(media.content_hash.clone()),
        actual_hash: Some(actual),
    }
}

/// Compare one cached message with its live counterpart (`None` = deleted).
pub fn compare_message(
    cached: &Message,
    live: Option<&Message>,
    require_views_match: bool,
) -> MessageVerification {
    let Some(live) = live else {
        return MessageVerification {
            message_id: cached.id,
            verified: false,
            date_match: false,
            text_match: false,
            views_match: false,
            discrepancies: vec![Discrepancy {
                kind: DiscrepancyKind::NotFound,
                cached: cached.id.to_string(),
                live: String::new(),
            }],
            media: None,
            live: None,
        };
    };

    let date_match = cached.date_utc == live.date_utc;
    let cached_text = strip_media_markers(&cached.text);
    let live_text = strip_media_markers(&live.text);
    let text_match = cached_text == live_text;
    let views_match = live.views.is_none() || live.views == cached.views;

    let mut discrepancies = Vec::new();
    if !date_match {
        discrepancies.push(Discrepancy {
            kind: DiscrepancyKind::DateMismatch,
            cached: cached.date_utc.to_rfc3339(),
            live: live.date_utc.to_rfc3339(),
        });
    }
    if !text_match {
        discrepancies.push(Discrepancy {
            kind: DiscrepancyKind::ContentMismatch,
            cached: cached_text,
            live: live_text,
        });
    }
    if !views_match {
        discrepancies.push(Discrepancy {
            kind: DiscrepancyKind::ViewsMismatch,
            cached: format!("{:?}", cached.views),
            live: format!("{:?}", live.views),
        });
    }

    MessageVerification {
        message_id: cached.id,
        verified: date_match && text_match && (views_match || !require_views_match),
        date_match,
        text_match,
        views_match,
        discrepancies,
        media: None,
        live: Some(LiveValues {
            date_utc: live.date_utc,
            date_msk: live.date_msk.clone(),
            text: live.text.clone(),
            views: live.views,
            forwards: live.forwards,
        }),
    }
}

pub struct ContentVerifier {
    gateway: Arc<dyn ChatGateway>,
    snapshots: Arc<dyn SnapshotStore>,
    reports: Arc<dyn ReportStore>,
    clock: LocalClock,
}

impl ContentVerifier {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        snapshots: Arc<dyn SnapshotStore>,
        reports: Arc<dyn ReportStore>,
        clock: LocalClock,
    ) -> Self {
        Self {
            gateway,
            snapshots,
            reports,
            clock,
        }
    }

    async fn verify_one(
        &self,
        channel: &ChannelRef,
        cached: &Message,
        opts: &VerifyOptions,
    ) -> Result<MessageVerification, DomainError> {
        let live = self.gateway.get_message(channel, cached.id).await?;
        let mut result = compare_message(cached, live.as_ref(), opts.require_views_match);

        if opts.verify_media {
            if let Some(media) = &cached.media_info {
                let check = verify_media_file(media).await;
                if check.status != MediaStatus::Verified {
                    result.verified = false;
                }
                result.media = Some(check);
            }
        }
        Ok(result)
    }

    /// Verify a sample of the snapshot at `path` and save the report.
    pub async fn verify_cache_file(
        &self,
        path: &Path,
        opts: &VerifyOptions,
    ) -> Result<(ContentVerificationReport, PathBuf), DomainError> {
        let snapshot = self.snapshots.load(path).await?;
        let channel = snapshot.meta.channel.clone();
        let channel_ref = self.gateway.resolve_channel(&channel).await?;

        let sample = sample_messages(&snapshot.messages, opts.sample_size);
        info!(channel = %channel, sample = sample.len(), "verifying cached content");

        let mut results = Vec::with_capacity(sample.len());
        for cached in sample {
            let result = self.verify_one(&channel_ref, cached, opts).await?;
            if !result.verified {
                warn!(message_id = result.message_id, "message failed verification");
            }
            results.push(result);
        }

        let verified_count = results.iter().filter(|r| r.verified).count();
        let verification_rate = if results.is_empty() {
            0.0
        } else {
            verified_count as f64 / results.len() as f64
        };

        let report = ContentVerificationReport {
            channel: channel.clone(),
            cache_file: path.display().to_string(),
            verified_at: self.clock.now(),
            sample_size: results.len(),
            verified_count,
            failed_count: results.len() - verified_count,
            verification_rate,
            verified: verification_rate >= PASS_RATE,
            results,
        };

        let file_name = format!(
            "content_verification_{}_{}.json",
            clean_channel(&channel),
            self.clock.file_stamp()
        );
        let value = serde_json::to_value(&report).map_err(|e| DomainError::Report(e.to_string()))?;
        let report_path = self.reports.save(&file_name, &value).await?;
        info!(
            channel = %channel,
            verified_count,
            rate = verification_rate,
            "content verification done"
        );
        Ok((report, report_path))
    }

    /// Rewrite failed messages with live values into `<stem>.corrected.json`.
    /// Returns `None` when nothing needed or could be corrected.
    pub async fn auto_correct(
        &self,
        path: &Path,
        report: &ContentVerificationReport,
    ) -> Result<Option<CorrectionOutcome>, DomainError> {
        if report.verified {
            info!("cache already verified, no corrections needed");
            return Ok(None);
        }

        let mut snapshot = self.snapshots.load(path).await?;
        let channel_ref = self.gateway.resolve_channel(&snapshot.meta.channel).await?;

        let mut corrections_applied = 0usize;
        for failed in report.results.iter().filter(|r| !r.verified) {
            let Some(idx) = snapshot.messages.iter().position(|m| m.id == failed.message_id)
            else {
                continue;
            };
            let Some(live) = self.gateway.get_message(&channel_ref, failed.message_id).await?
            else {
                continue;
            };
            let cached = &mut snapshot.messages[idx];
            cached.date_utc = live.date_utc;
            cached.date_msk = live.date_msk;
            cached.text = live.text;
            cached.views = live.views;
            cached.forwards = live.forwards;
            corrections_applied += 1;
        }

        if corrections_applied == 0 {
            warn!("could not correct any inconsistencies");
            return Ok(None);
        }

        snapshot.meta.correction = Some(CorrectionMeta {
            corrections_applied,
            corrected_at: self.clock.now(),
            original_file: path.display().to_string(),
        });
        let out = corrected_path(path);
        self.snapshots.save_as(&out, &snapshot).await?;
        info!(path = %out.display(), corrections_applied, "corrected cache saved");
        Ok(Some(CorrectionOutcome {
            path: out,
            corrections_applied,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockGateway, message_at};
    use crate::adapters::persistence::{FsReportStore, FsSnapshotStore};
    use crate::domain::{FetchStrategy, Snapshot, ValidationReport};
    use chrono::FixedOffset;

    fn clock() -> LocalClock {
        LocalClock::fixed(
            "2025-09-15T09:30:00Z".parse().unwrap(),
            FixedOffset::east_opt(3 * 3600).unwrap(),
        )
    }

    fn history() -> Vec<Message> {
        (1..=20)
            .rev()
            .map(|id| message_at(id, &format!("2025-09-15 {:02}:00:00", id), &format!("post {}", id)))
            .collect()
    }

    struct Fixture {
        dir: tempfile::TempDir,
        gateway: Arc<MockGateway>,
        snapshots: Arc<FsSnapshotStore>,
        verifier: ContentVerifier,
        path: PathBuf,
    }

    async fn fixture(cached: Vec<Message>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = Arc::new(FsSnapshotStore::new(dir.path().join("cache")));
        let snapshot = Snapshot::new("@aiclub", clock().now(), FetchStrategy::Manual, cached);
        let path = snapshots.save(&snapshot, "20250915_120000", None).await.unwrap();
        let gateway = Arc::new(MockGateway::new("@aiclub", history()));
        let verifier = ContentVerifier::new(
            gateway.clone(),
            snapshots.clone(),
            Arc::new(FsReportStore::new(dir.path().join("verification"))),
            clock(),
        );
        Fixture {
            dir,
            gateway,
            snapshots,
            verifier,
            path,
        }
    }

    #[test]
    fn test_sampling() {
        let messages = history();
        let ids: Vec<i32> = sample_messages(&messages, 5).iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![20, 16, 12, 8, 4]);
        assert_eq!(sample_messages(&messages[..3], 5).len(), 3);
        assert!(sample_messages(&messages, 0).is_empty());
    }

    #[test]
    fn test_compare_strips_markers() {
        let cached = message_at(1, "2025-09-15 10:00:00", "📷 [Photo] caption");
        let live = message_at(1, "2025-09-15 10:00:00", "caption");
        let r = compare_message(&cached, Some(&live), false);
        assert!(r.verified);

        let r = compare_message(&cached, None, false);
        assert!(!r.verified);
        assert_eq!(r.discrepancies[0].kind, DiscrepancyKind::NotFound);
    }

    #[tokio::test]
    async fn test_unmodified_cache_rate_is_one() {
        let f = fixture(history()).await;
        let (report, report_path) = f
            .verifier
            .verify_cache_file(&f.path, &VerifyOptions::default())
            .await
            .unwrap();
        assert_eq!(report.sample_size, 10);
        assert_eq!(report.verification_rate, 1.0);
        assert!(report.verified);
        assert!(ValidationReport::from(&report).passed());
        assert!(report_path
            .to_string_lossy()
            .ends_with("content_verification_aiclub_20250915_123000.json"));
        assert!(f.dir.path().join("verification").exists());
    }

    #[tokio::test]
    async fn test_edits_fail_and_auto_correct() {
        let f = fixture(history()).await;
        // Sampled ids with step 2: 20, 18, ..., 2
        for id in [20, 18] {
            f.gateway.edit(id, |m| m.text = "edited".into());
        }
        f.gateway.remove(16);

        let (report, _) = f
            .verifier
            .verify_cache_file(&f.path, &VerifyOptions::default())
            .await
            .unwrap();
        assert_eq!(report.failed_count, 3);
        assert!((report.verification_rate - 0.7).abs() < 1e-9);
        assert!(!report.verified);

        let outcome = f
            .verifier
            .auto_correct(&f.path, &report)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.corrections_applied, 2);
        assert!(outcome.path.to_string_lossy().ends_with("20250915_120000.corrected.json"));

        let corrected = f.snapshots.load(&outcome.path).await.unwrap();
        assert_eq!(corrected.messages[0].text, "edited");
        assert_eq!(corrected.meta.correction.unwrap().corrections_applied, 2);
        let original = f.snapshots.load(&f.path).await.unwrap();
        assert_eq!(original.messages[0].text, "post 20");
    }

    #[tokio::test]
    async fn test_gateway_failure_aborts_verification() {
        let f = fixture(history()).await;
        let channel = f.gateway.resolve_channel("@aiclub").await.unwrap();
        f.gateway.fail_requests(true);

        let cached = message_at(5, "2025-09-15 05:00:00", "post 5");
        let res = f.verifier.verify_one(&channel, &cached, &VerifyOptions::default()).await;
        assert!(matches!(res, Err(DomainError::Gateway(_))));

        let res = f
            .verifier
            .verify_cache_file(&f.path, &VerifyOptions::default())
            .await;
        assert!(matches!(res, Err(DomainError::Gateway(_))));
        assert!(!f.dir.path().join("verification").exists());
    }

    #[tokio::test]
    async fn test_media_hash_mismatch_fails_message() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("1.bin");
        tokio::fs::write(&file, b"abc").await.unwrap();
        let mut media = MediaInfo {
            file_path: file.display().to_string(),
            file_name: None,
            file_size: 3,
            content_hash: hash_file(&file).await.unwrap(),
            download_time: None,
        };
        assert_eq!(verify_media_file(&media).await.status, MediaStatus::Verified);

        tokio::fs::write(&file, b"abd").await.unwrap();
        assert_eq!(verify_media_file(&media).await.status, MediaStatus::HashMismatch);

        media.file_path = dir.path().join("missing.bin").display().to_string();
        assert_eq!(verify_media_file(&media).await.status, MediaStatus::FileMissing);
    }
}
