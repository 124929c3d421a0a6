//! Temporal anchors: per-(channel, date) boundary message ids used to pick fetch offsets.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::entities::{clean_channel, normalize_channel};
use crate::domain::{Anchor, AnchorEntry, DomainError, FetchOffset, FetchStrategy, Message};
use crate::ports::AnchorStore;
use crate::shared::clock::LocalClock;

pub const ANCHOR_VERSION: &str = "1.0";
pub const DEFAULT_ANCHOR_RETENTION_DAYS: i64 = 90;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorValidation {
    pub valid: bool,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelAnchorStats {
    pub channel: String,
    pub anchor_count: usize,
    pub oldest: Option<NaiveDate>,
    pub newest: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorStats {
    pub total_channels: usize,
    pub total_anchors: usize,
    pub oldest_anchor: Option<NaiveDate>,
    pub newest_anchor: Option<NaiveDate>,
    pub channels: Vec<ChannelAnchorStats>,
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}

/// Check the fields of a stored anchor.
pub fn validate_anchor(anchor: &Anchor) -> AnchorValidation {
    let reason = if anchor.message_id <= 0 {
        Some("Invalid message ID")
    } else if NaiveTime::parse_from_str(&anchor.timestamp, "%H:%M:%S").is_err() {
        Some("Invalid timestamp format")
    } else if parse_date_key(&anchor.date).is_none() {
        Some("Invalid date format")
    } else {
        None
    };
    match reason {
        Some(r) => AnchorValidation {
            valid: false,
            reason: r.to_string(),
        },
        None => AnchorValidation {
            valid: true,
            reason: "Anchor is valid".to_string(),
        },
    }
}

pub struct AnchorService {
    store: Arc<dyn AnchorStore>,
    clock: LocalClock,
}

impl AnchorService {
    pub fn new(store: Arc<dyn AnchorStore>, clock: LocalClock) -> Self {
        Self { store, clock }
    }

    pub async fn get_anchor(
        &self,
        channel: &str,
        date: NaiveDate,
    ) -> Result<Option<Anchor>, DomainError> {
        self.store.get(channel, &date_key(date)).await
    }

    pub async fn previous_day_anchor(
        &self,
        channel: &str,
        date: NaiveDate,
    ) -> Result<Option<Anchor>, DomainError> {
        self.get_anchor(channel, date - Duration::days(1)).await
    }

    /// Store an anchor after validating it.
    pub async fn set_anchor(
        &self,
        channel: &str,
        message_id: i64,
        timestamp: &str,
        date: NaiveDate,
    ) -> Result<Anchor, DomainError> {
        let anchor = Anchor {
            message_id,
            timestamp: timestamp.to_string(),
            date: date_key(date),
            created_at: Some(self.clock.now()),
            anchor_version: ANCHOR_VERSION.to_string(),
        };
        let check = validate_anchor(&anchor);
        if !check.valid {
            return Err(DomainError::Anchor(check.reason));
        }
        self.store.set(channel, anchor.clone()).await?;
        info!(channel, message_id, date = %anchor.date, timestamp, "anchor set");
        Ok(anchor)
    }

    /// Previous day's anchor, else the most recent anchor, else offset 0.
    pub async fn calculate_fetch_offset(
        &self,
        channel: &str,
        target_date: NaiveDate,
    ) -> Result<FetchOffset, DomainError> {
        if let Some(prev) = self.previous_day_anchor(channel, target_date).await? {
            return Ok(FetchOffset {
                strategy: FetchStrategy::Anchor,
                offset_id: anchor_offset(&prev)?,
                reason: format!("Using anchor from {} at {}", prev.date, prev.timestamp),
                anchor: Some(prev),
            });
        }

        let all = self.store.all().await?;
        let latest = all
            .get(&clean_channel(channel))
            .and_then(|dates| dates.last_key_value())
            .map(|(_, a)| a.clone());
        if let Some(latest) = latest {
            return Ok(FetchOffset {
                strategy: FetchStrategy::ClosestAnchor,
                offset_id: anchor_offset(&latest)?,
                reason: format!(
                    "Using closest anchor from {} at {}",
                    latest.date, latest.timestamp
                ),
                anchor: Some(latest),
            });
        }

        Ok(FetchOffset {
            strategy: FetchStrategy::SmartOffset,
            offset_id: 0,
            reason: "No anchors available, using smart offset strategy".to_string(),
            anchor: None,
        })
    }

    /// Anchor `date` at its earliest message in `messages` (newest first).
    pub async fn update_from_messages(
        &self,
        channel: &str,
        messages: &[Message],
        date: NaiveDate,
    ) -> Result<Option<Anchor>, DomainError> {
        let Some(first) = messages.iter().rev().find(|m| m.is_on(date)) else {
            debug!(channel, %date, "no messages on date, anchor unchanged");
            return Ok(None);
        };
        let anchor = self
            .set_anchor(
                channel,
                i64::from(first.id),
                first.local_time_str(),
                date,
            )
            .await?;
        Ok(Some(anchor))
    }

    pub async fn validate(
        &self,
        channel: &str,
        date: NaiveDate,
    ) -> Result<AnchorValidation, DomainError> {
        Ok(match self.get_anchor(channel, date).await? {
            Some(anchor) => validate_anchor(&anchor),
            None => AnchorValidation {
                valid: false,
                reason: "No anchor found".to_string(),
            },
        })
    }

    /// Anchors sorted by (channel, date).
    pub async fn list(&self, channel: Option<&str>) -> Result<Vec<AnchorEntry>, DomainError> {
        let wanted = channel.map(clean_channel);
        let all = self.store.all().await?;
        Ok(all
            .into_iter()
            .filter(|(ch, _)| wanted.as_ref().is_none_or(|w| w == ch))
            .flat_map(|(ch, dates)| {
                dates.into_values().map(move |anchor| AnchorEntry {
                    channel: normalize_channel(&ch),
                    anchor,
                })
            })
            .collect())
    }

    /// Drop anchors older than `retention_days` and any with a malformed date key.
    pub async fn cleanup(&self, retention_days: i64) -> Result<usize, DomainError> {
        let cutoff = self.clock.today() - Duration::days(retention_days);
        let mut all = self.store.all().await?;
        let mut removed = 0usize;
        for dates in all.values_mut() {
            let before = dates.len();
            dates.retain(|key, _| parse_date_key(key).is_some_and(|d| d >= cutoff));
            removed += before - dates.len();
        }
        all.retain(|_, dates| !dates.is_empty());

        if removed > 0 {
            self.store.replace_all(all).await?;
            info!(removed, retention_days, "cleaned up old anchors");
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<AnchorStats, DomainError> {
        let all = self.store.all().await?;
        let mut channels = Vec::new();
        let mut all_dates = Vec::new();
        for (ch, dates) in &all {
            let mut parsed: Vec<NaiveDate> = dates.keys().filter_map(|k| parse_date_key(k)).collect();
            parsed.sort();
            channels.push(ChannelAnchorStats {
                channel: normalize_channel(ch),
                anchor_count: dates.len(),
                oldest: parsed.first().copied(),
                newest: parsed.last().copied(),
            });
            all_dates.extend(parsed);
        }
        Ok(AnchorStats {
            total_channels: all.len(),
            total_anchors: all.values().map(BTreeMap::len).sum(),
            oldest_anchor: all_dates.iter().min().copied(),
            newest_anchor: all_dates.iter().max().copied(),
            channels,
        })
    }
}

fn anchor_offset(anchor: &Anchor) -> Result<i32, DomainError> {
    i32::try_from(anchor.message_id)
        .map_err(|_| DomainError::Anchor(format!("message id {} out of range", anchor.message_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::message_at;
    use crate::adapters::persistence::AnchorsJson;
    use chrono::FixedOffset;

    fn clock() -> LocalClock {
        // 2025-09-15 12:00 at +03:00
        LocalClock::fixed(
            "2025-09-15T09:00:00Z".parse().unwrap(),
            FixedOffset::east_opt(3 * 3600).unwrap(),
        )
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    async fn service(dir: &tempfile::TempDir) -> AnchorService {
        let store = AnchorsJson::new(dir.path().join("anchors.json"));
        store.load().await.unwrap();
        AnchorService::new(Arc::new(store), clock())
    }

    #[tokio::test]
    async fn test_offset_strategies() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir).await;
        let today = date("2025-09-15");

        let off = svc.calculate_fetch_offset("@aiclub", today).await.unwrap();
        assert_eq!(off.strategy, FetchStrategy::SmartOffset);
        assert_eq!(off.offset_id, 0);

        svc.set_anchor("@aiclub", 500, "07:00:00", date("2025-09-10")).await.unwrap();
        let off = svc.calculate_fetch_offset("@aiclub", today).await.unwrap();
        assert_eq!(off.strategy, FetchStrategy::ClosestAnchor);
        assert_eq!(off.offset_id, 500);

        svc.set_anchor("@aiclub", 700, "00:58:11", date("2025-09-14")).await.unwrap();
        let off = svc.calculate_fetch_offset("aiclub", today).await.unwrap();
        assert_eq!(off.strategy, FetchStrategy::Anchor);
        assert_eq!(off.offset_id, 700);
    }

    #[tokio::test]
    async fn test_update_from_messages_picks_earliest_of_date() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir).await;
        let messages = vec![
            message_at(12, "2025-09-15 10:00:00", "c"),
            message_at(11, "2025-09-15 00:10:00", "b"),
            message_at(10, "2025-09-14 23:50:00", "a"),
        ];
        let anchor = svc
            .update_from_messages("@aiclub", &messages, date("2025-09-15"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(anchor.message_id, 11);
        assert_eq!(anchor.timestamp, "00:10:00");

        let none = svc
            .update_from_messages("@aiclub", &messages, date("2025-09-01"))
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_set_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir).await;
        assert!(svc.set_anchor("@c", 0, "00:00:00", date("2025-09-14")).await.is_err());
        assert!(svc.set_anchor("@c", 5, "25:00", date("2025-09-14")).await.is_err());
        let v = svc.validate("@c", date("2025-09-14")).await.unwrap();
        assert!(!v.valid);
        assert_eq!(v.reason, "No anchor found");
    }

    #[test]
    fn test_validate_anchor_date() {
        let anchor = Anchor {
            message_id: 1,
            timestamp: "10:00:00".into(),
            date: "2025-99-01".into(),
            created_at: None,
            anchor_version: ANCHOR_VERSION.into(),
        };
        assert_eq!(validate_anchor(&anchor).reason, "Invalid date format");
    }

    #[tokio::test]
    async fn test_cleanup_removes_old_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(AnchorsJson::new(dir.path().join("anchors.json")));
        let svc = AnchorService::new(store.clone(), clock());

        svc.set_anchor("@a", 1, "10:00:00", date("2025-01-01")).await.unwrap();
        svc.set_anchor("@a", 2, "10:00:00", date("2025-09-14")).await.unwrap();
        store
            .set(
                "@b",
                Anchor {
                    message_id: 3,
                    timestamp: "10:00:00".into(),
                    date: "garbage".into(),
                    created_at: None,
                    anchor_version: ANCHOR_VERSION.into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(svc.cleanup(90).await.unwrap(), 2);
        let left = svc.list(None).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].channel, "@a");
        assert_eq!(left[0].anchor.message_id, 2);
    }

    #[tokio::test]
    async fn test_stats() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir).await;
        svc.set_anchor("@a", 1, "10:00:00", date("2025-09-10")).await.unwrap();
        svc.set_anchor("@a", 2, "10:00:00", date("2025-09-12")).await.unwrap();
        svc.set_anchor("@b", 3, "10:00:00", date("2025-09-11")).await.unwrap();

        let stats = svc.stats().await.unwrap();
        assert_eq!(stats.total_channels, 2);
        assert_eq!(stats.total_anchors, 3);
        assert_eq!(stats.oldest_anchor, Some(date("2025-09-10")));
        assert_eq!(stats.newest_anchor, Some(date("2025-09-12")));
        assert_eq!(svc.list(Some("@a")).await.unwrap().len(), 2);
    }
}
