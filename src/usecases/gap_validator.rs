//! Message id sequence checks for one channel-day.
//!
//! Ids grow over time, so holes in a newest-first list are either deleted
//! posts or data the cache never received. [`GapPolicy`] decides which is
//! which; the result is a judgement, not a certainty.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info};

use crate::domain::entities::{normalize_channel, preview};
use crate::domain::reports::{
    AnchorCheck, BoundaryMessage, CompletenessReport, ConfidenceLevel, ContinuityStatus,
    ContinuityValidation, DailyBoundaryValidation, Gap, GapKind, SequenceValidation,
    sequence_points,
};
use crate::domain::{DateWindow, DomainError, Message};
use crate::ports::ArchiveStore;
use crate::usecases::anchor_service::AnchorService;

const BOUNDARY_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapPolicy {
    /// Gaps up to this size are treated as deleted posts.
    pub deletion_threshold: i64,
    /// A significant gap above this size makes the sequence invalid.
    pub max_gap_size: i64,
    /// Fewer messages than this are not judged.
    pub min_sequence_length: usize,
}

impl Default for GapPolicy {
    fn default() -> Self {
        Self {
            deletion_threshold: 5,
            max_gap_size: 100,
            min_sequence_length: 10,
        }
    }
}

impl GapPolicy {
    pub fn classify(&self, gap_size: i64) -> GapKind {
        if gap_size <= self.deletion_threshold {
            GapKind::LikelyDeletion
        } else {
            GapKind::Significant
        }
    }

    pub fn validate_sequence(&self, messages: &[Message]) -> SequenceValidation {
        let mut ids: Vec<i32> = messages.iter().map(|m| m.id).collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));

        let gaps: Vec<Gap> = ids
            .windows(2)
            .enumerate()
            .filter_map(|(index, pair)| {
                let gap_size = i64::from(pair[0]) - i64::from(pair[1]) - 1;
                (gap_size > 0).then(|| Gap {
                    start_id: pair[1],
                    end_id: pair[0],
                    gap_size,
                    kind: self.classify(gap_size),
                    index,
                })
            })
            .collect();

        let likely_deletions = gaps
            .iter()
            .filter(|g| g.kind == GapKind::LikelyDeletion)
            .count();
        let significant_gaps = gaps.len() - likely_deletions;
        let largest_gap = gaps.iter().map(|g| g.gap_size).max().unwrap_or(0);
        let id_range = match (ids.last(), ids.first()) {
            (Some(lo), Some(hi)) => Some((*lo, *hi)),
            _ => None,
        };

        let (valid, reason) = if ids.len() < self.min_sequence_length {
            (
                true,
                Some(format!(
                    "Insufficient messages for validation (need {}, have {})",
                    self.min_sequence_length,
                    ids.len()
                )),
            )
        } else {
            let too_large = gaps
                .iter()
                .any(|g| g.kind == GapKind::Significant && g.gap_size > self.max_gap_size);
            let reason = if gaps.is_empty() {
                None
            } else if significant_gaps == 0 {
                Some(format!(
                    "Only minor gaps detected (likely deletions), largest: {}",
                    largest_gap
                ))
            } else if too_large {
                Some(format!(
                    "Large gap detected ({} messages), may indicate data loss",
                    largest_gap
                ))
            } else {
                Some(format!(
                    "{} significant gaps detected, largest: {}",
                    significant_gaps, largest_gap
                ))
            };
            (!too_large, reason)
        };

        SequenceValidation {
            valid,
            reason,
            total_messages: ids.len(),
            id_range,
            gaps,
            likely_deletions,
            significant_gaps,
            largest_gap,
        }
    }
}

/// Messages of `date`, oldest first.
fn day_messages(messages: &[Message], date: NaiveDate) -> Vec<&Message> {
    let window = DateWindow::day(date);
    let mut day: Vec<&Message> = messages
        .iter()
        .filter(|m| window.contains_message(m))
        .collect();
    day.sort_by(|a, b| a.date_msk.cmp(&b.date_msk).then(a.id.cmp(&b.id)));
    day
}

fn boundary_message(m: &Message) -> BoundaryMessage {
    BoundaryMessage {
        id: m.id,
        date_msk: m.date_msk.clone(),
        text_preview: preview(&m.text, BOUNDARY_PREVIEW_CHARS),
    }
}

pub struct GapValidator {
    policy: GapPolicy,
    anchors: Arc<AnchorService>,
    archive: Arc<dyn ArchiveStore>,
}

impl GapValidator {
    pub fn new(
        policy: GapPolicy,
        anchors: Arc<AnchorService>,
        archive: Arc<dyn ArchiveStore>,
    ) -> Self {
        Self {
            policy,
            anchors,
            archive,
        }
    }

    pub fn policy(&self) -> &GapPolicy {
        &self.policy
    }

    pub async fn validate_daily_boundary(
        &self,
        channel: &str,
        messages: &[Message],
        date: NaiveDate,
    ) -> Result<DailyBoundaryValidation, DomainError> {
        let day = day_messages(messages, date);
        let (Some(first), Some(last)) = (day.first(), day.last()) else {
            let reason = if messages.is_empty() {
                "No messages provided for boundary validation".to_string()
            } else {
                format!("No messages found for target date {}", date)
            };
            return Ok(DailyBoundaryValidation {
                valid: false,
                reason: Some(reason),
                date,
                total_messages: 0,
                first_message: None,
                last_message: None,
                anchor_check: AnchorCheck::NoAnchor,
                previous_anchor_id: None,
            });
        };

        let previous = self.anchors.previous_day_anchor(channel, date).await?;
        let anchor_check = match &previous {
            None => AnchorCheck::NoAnchor,
            Some(a) if i64::from(first.id) > a.message_id => AnchorCheck::Valid,
            Some(_) => AnchorCheck::Suspicious,
        };
        debug!(channel, %date, ?anchor_check, "daily boundary");

        Ok(DailyBoundaryValidation {
            valid: true,
            reason: None,
            date,
            total_messages: day.len(),
            first_message: Some(boundary_message(first)),
            last_message: Some(boundary_message(last)),
            anchor_check,
            previous_anchor_id: previous.map(|a| a.message_id),
        })
    }

    /// Compare the first message of `date` with the newest archived message of the day before.
    pub async fn validate_continuity(
        &self,
        channel: &str,
        messages: &[Message],
        date: NaiveDate,
    ) -> Result<ContinuityValidation, DomainError> {
        let previous_date = date - Duration::days(1);
        let previous_last_id = self
            .archive
            .read(channel, &previous_date.format("%Y-%m-%d").to_string())
            .await?
            .and_then(|s| s.messages.first().map(|m| m.id));
        let current_first_id = day_messages(messages, date).first().map(|m| m.id);

        let (status, id_gap) = match (previous_last_id, current_first_id) {
            (None, _) => (ContinuityStatus::NoPreviousData, None),
            (Some(_), None) => (ContinuityStatus::NoCurrentData, None),
            (Some(prev), Some(cur)) => {
                let gap = i64::from(cur) - i64::from(prev) - 1;
                let status = if gap <= self.policy.deletion_threshold {
                    ContinuityStatus::Good
                } else {
                    ContinuityStatus::GapDetected
                };
                (status, Some(gap))
            }
        };

        Ok(ContinuityValidation {
            status,
            previous_date,
            previous_last_id,
            current_first_id,
            id_gap,
        })
    }

    /// Sequence, daily boundary and continuity with a 0..=100 score.
    pub async fn comprehensive(
        &self,
        channel: &str,
        messages: &[Message],
        date: NaiveDate,
    ) -> Result<CompletenessReport, DomainError> {
        let channel = normalize_channel(channel);
        let sequence = self.policy.validate_sequence(messages);
        let daily_boundary = self.validate_daily_boundary(&channel, messages, date).await?;
        let continuity = self.validate_continuity(&channel, messages, date).await?;

        let mut score = 0u32;
        if sequence.valid {
            score += sequence_points(&sequence);
        }
        if daily_boundary.valid {
            score += 30;
            if daily_boundary.anchor_check == AnchorCheck::Valid {
                score += 10;
            }
        }
        score += match continuity.status {
            ContinuityStatus::Good => 30,
            ContinuityStatus::NoPreviousData => 15,
            ContinuityStatus::GapDetected | ContinuityStatus::NoCurrentData => 0,
        };
        let score = score.min(100);

        info!(
            channel = %channel,
            %date,
            score,
            gaps = sequence.gaps.len(),
            "completeness validated"
        );

        Ok(CompletenessReport {
            channel,
            date,
            sequence,
            daily_boundary,
            continuity,
            score,
            confidence_level: ConfidenceLevel::from_score(score),
        })
    }
}
