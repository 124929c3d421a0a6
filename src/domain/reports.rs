//! Validation report types.
//!
//! Every validator produces its own detailed report; all of them convert into
//! the common [`ValidationReport`] used for the exit code and as the
//! auto-correction gate.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entities::{ExpansionDirection, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Verified,
    Unverified,
    ExpansionRequired,
    Insufficient,
}

/// Common shape of every validator's outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    /// In `[0, 1]`.
    pub confidence_score: f64,
    pub gaps: Vec<Gap>,
    pub discrepancies: Vec<String>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.status == ValidationStatus::Verified
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    /// Small hole, most likely deleted posts.
    LikelyDeletion,
    /// Too large to be deletions; data may be missing.
    Significant,
}

/// Missing ids between two consecutive cached messages (exclusive on both ends).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    /// Lower existing id.
    pub start_id: i32,
    /// Higher existing id.
    pub end_id: i32,
    pub gap_size: i64,
    pub kind: GapKind,
    /// Position in the descending id list where the gap starts.
    pub index: usize,
}

// Sequence / daily / continuity

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceValidation {
    pub valid: bool,
    pub reason: Option<String>,
    pub total_messages: usize,
    /// `(lowest, highest)` id.
    pub id_range: Option<(i32, i32)>,
    pub gaps: Vec<Gap>,
    pub likely_deletions: usize,
    pub significant_gaps: usize,
    pub largest_gap: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorCheck {
    Valid,
    Suspicious,
    NoAnchor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryMessage {
    pub id: i32,
    pub date_msk: String,
    pub text_preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyBoundaryValidation {
    pub valid: bool,
    pub reason: Option<String>,
    pub date: NaiveDate,
    pub total_messages: usize,
    pub first_message: Option<BoundaryMessage>,
    pub last_message: Option<BoundaryMessage>,
    pub anchor_check: AnchorCheck,
    pub previous_anchor_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuityStatus {
    Good,
    GapDetected,
    NoPreviousData,
    NoCurrentData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContinuityValidation {
    pub status: ContinuityStatus,
    pub previous_date: NaiveDate,
    pub previous_last_id: Option<i32>,
    pub current_first_id: Option<i32>,
    pub id_gap: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfidenceLevel {
    #[serde(rename = "Very High")]
    VeryHigh,
    High,
    Medium,
    Low,
    #[serde(rename = "Very Low")]
    VeryLow,
}

impl ConfidenceLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            90.. => ConfidenceLevel::VeryHigh,
            75..=89 => ConfidenceLevel::High,
            60..=74 => ConfidenceLevel::Medium,
            40..=59 => ConfidenceLevel::Low,
            _ => ConfidenceLevel::VeryLow,
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConfidenceLevel::VeryHigh => "Very High",
            ConfidenceLevel::High => "High",
            ConfidenceLevel::Medium => "Medium",
            ConfidenceLevel::Low => "Low",
            ConfidenceLevel::VeryLow => "Very Low",
        };
        f.write_str(s)
    }
}

/// Combined gap, boundary and continuity result for one channel-day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletenessReport {
    pub channel: String,
    pub date: NaiveDate,
    pub sequence: SequenceValidation,
    pub daily_boundary: DailyBoundaryValidation,
    pub continuity: ContinuityValidation,
    /// 0..=100 points.
    pub score: u32,
    pub confidence_level: ConfidenceLevel,
}

// Boundary / freshness

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    Direct,
    History,
    Range,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodResult {
    pub method: VerificationMethod,
    pub found_id: Option<i32>,
    pub date_utc: Option<DateTime<Utc>>,
    pub agrees: bool,
}

/// One cached boundary message checked against the live API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryCheck {
    pub message_id: i32,
    pub date_msk: String,
    pub methods: Vec<MethodResult>,
    pub agreeing: usize,
    pub confidence: f64,
    /// Strict majority of methods agree.
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreshnessCheck {
    pub newer_in_window: Option<i32>,
    pub older_in_window: Option<i32>,
    pub expansion: Option<ExpansionDirection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryReport {
    pub channel: String,
    pub filter: String,
    pub window_start: Option<NaiveDateTime>,
    pub window_end: Option<NaiveDateTime>,
    pub cache_file: String,
    pub messages_in_window: usize,
    pub earliest: Option<BoundaryCheck>,
    pub latest: Option<BoundaryCheck>,
    pub freshness: FreshnessCheck,
    pub status: ValidationStatus,
    pub confidence: f64,
}

// Border (first message of a date)

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TripleStatus {
    Verified,
    Partial,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripleVerification {
    pub message_id: i32,
    pub methods_successful: usize,
    pub methods_total: usize,
    pub verification_score: f64,
    pub status: TripleStatus,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirstMessageReport {
    pub channel: String,
    pub date: NaiveDate,
    pub generated_at: DateTime<FixedOffset>,
    pub messages_scanned: usize,
    pub first_message: Option<Message>,
    /// An older scan found another message on the same date.
    pub earlier_in_date_found: bool,
    pub verification: Option<TripleVerification>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BorderComparison {
    pub channel: String,
    pub date: NaiveDate,
    pub cached_first_id: Option<i32>,
    pub live_first_id: Option<i32>,
    pub matches: bool,
}

/// Outcome of the filter's border check on single-date selectors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BorderCheck {
    /// All checked older messages belong to an earlier date.
    Confirmed { checked: usize },
    /// Older messages still on the target date.
    Failed { issues: Vec<i32>, checked: usize },
    /// Not enough older messages in the cache.
    Incomplete { available: usize },
    Skipped,
}

// Content verification

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    NotFound,
    DateMismatch,
    ContentMismatch,
    ViewsMismatch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    pub cached: String,
    pub live: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaStatus {
    NoMedia,
    FileMissing,
    NoHash,
    Verified,
    HashMismatch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaVerification {
    pub status: MediaStatus,
    pub expected_hash: Option<String>,
    pub actual_hash: Option<String>,
}

/// Live values kept for auto-correction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveValues {
    pub date_utc: DateTime<Utc>,
    pub date_msk: String,
    pub text: String,
    pub views: Option<i32>,
    pub forwards: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageVerification {
    pub message_id: i32,
    pub verified: bool,
    pub date_match: bool,
    pub text_match: bool,
    pub views_match: bool,
    pub discrepancies: Vec<Discrepancy>,
    pub media: Option<MediaVerification>,
    pub live: Option<LiveValues>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentVerificationReport {
    pub channel: String,
    pub cache_file: String,
    pub verified_at: DateTime<FixedOffset>,
    pub sample_size: usize,
    pub verified_count: usize,
    pub failed_count: usize,
    pub verification_rate: f64,
    pub verified: bool,
    pub results: Vec<MessageVerification>,
}

// Conversions into the common report

impl From<&SequenceValidation> for ValidationReport {
    fn from(v: &SequenceValidation) -> Self {
        let confidence_score = if v.gaps.is_empty() {
            1.0
        } else {
            f64::from(sequence_points(v)) / 40.0
        };
        ValidationReport {
            status: if v.valid {
                ValidationStatus::Verified
            } else {
                ValidationStatus::Unverified
            },
            confidence_score,
            gaps: v.gaps.clone(),
            discrepancies: v.reason.iter().cloned().collect(),
        }
    }
}

/// Sequence share of the completeness score (max 40).
pub fn sequence_points(v: &SequenceValidation) -> u32 {
    if v.gaps.is_empty() {
        40
    } else {
        let penalty = v.largest_gap.clamp(0, 20) as u32;
        (40 - penalty).max(10)
    }
}

impl From<&CompletenessReport> for ValidationReport {
    fn from(r: &CompletenessReport) -> Self {
        let mut discrepancies = Vec::new();
        if let Some(reason) = &r.sequence.reason {
            discrepancies.push(format!("sequence: {}", reason));
        }
        if let Some(reason) = &r.daily_boundary.reason {
            discrepancies.push(format!("daily boundary: {}", reason));
        }
        if r.daily_boundary.anchor_check == AnchorCheck::Suspicious {
            discrepancies.push("first message id is not above previous day's anchor".into());
        }
        if let (ContinuityStatus::GapDetected, Some(gap)) = (r.continuity.status, r.continuity.id_gap)
        {
            discrepancies.push(format!("continuity gap of {} ids with previous day", gap));
        }

        let status = if r.daily_boundary.total_messages == 0 {
            ValidationStatus::Insufficient
        } else if r.sequence.valid
            && r.daily_boundary.valid
            && r.continuity.status != ContinuityStatus::GapDetected
        {
            ValidationStatus::Verified
        } else {
            ValidationStatus::Unverified
        };

        ValidationReport {
            status,
            confidence_score: f64::from(r.score) / 100.0,
            gaps: r.sequence.gaps.clone(),
            discrepancies,
        }
    }
}

impl From<&BoundaryReport> for ValidationReport {
    fn from(r: &BoundaryReport) -> Self {
        let mut discrepancies = Vec::new();
        for check in r.earliest.iter().chain(r.latest.iter()) {
            if !check.verified {
                discrepancies.push(format!(
                    "message {}: {}/{} methods agree",
                    check.message_id,
                    check.agreeing,
                    check.methods.len()
                ));
            }
        }
        if let Some(dir) = r.freshness.expansion {
            discrepancies.push(format!("cache needs {} expansion", dir));
        }
        ValidationReport {
            status: r.status,
            confidence_score: r.confidence,
            gaps: Vec::new(),
            discrepancies,
        }
    }
}

impl From<&FirstMessageReport> for ValidationReport {
    fn from(r: &FirstMessageReport) -> Self {
        let (status, confidence_score) = match (&r.first_message, &r.verification) {
            (None, _) => (ValidationStatus::Insufficient, 0.0),
            (Some(_), Some(v)) if v.status != TripleStatus::Failed && !r.earlier_in_date_found => {
                (ValidationStatus::Verified, v.verification_score)
            }
            (Some(_), Some(v)) => (ValidationStatus::Unverified, v.verification_score),
            (Some(_), None) => (ValidationStatus::Unverified, 0.0),
        };
        let mut discrepancies = Vec::new();
        if r.earlier_in_date_found {
            discrepancies.push("an earlier message on the same date exists".to_string());
        }
        ValidationReport {
            status,
            confidence_score,
            gaps: Vec::new(),
            discrepancies,
        }
    }
}

impl From<&BorderComparison> for ValidationReport {
    fn from(c: &BorderComparison) -> Self {
        let (status, confidence_score) = match (c.cached_first_id, c.live_first_id) {
            (None, _) | (_, None) => (ValidationStatus::Insufficient, 0.0),
            _ if c.matches => (ValidationStatus::Verified, 1.0),
            _ => (ValidationStatus::Unverified, 0.0),
        };
        let discrepancies = if c.matches {
            Vec::new()
        } else {
            vec![format!(
                "cached first message {:?} differs from live {:?}",
                c.cached_first_id, c.live_first_id
            )]
        };
        ValidationReport {
            status,
            confidence_score,
            gaps: Vec::new(),
            discrepancies,
        }
    }
}

impl From<&ContentVerificationReport> for ValidationReport {
    fn from(r: &ContentVerificationReport) -> Self {
        let discrepancies = r
            .results
            .iter()
            .flat_map(|m| {
                m.discrepancies
                    .iter()
                    .map(move |d| format!("message {}: {:?}", m.message_id, d.kind))
            })
            .collect();
        ValidationReport {
            status: if r.verified {
                ValidationStatus::Verified
            } else {
                ValidationStatus::Unverified
            },
            confidence_score: r.verification_rate,
            gaps: Vec::new(),
            discrepancies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence(gaps: Vec<Gap>, valid: bool) -> SequenceValidation {
        let largest_gap = gaps.iter().map(|g| g.gap_size).max().unwrap_or(0);
        SequenceValidation {
            valid,
            reason: None,
            total_messages: 20,
            id_range: Some((1, 40)),
            likely_deletions: gaps.iter().filter(|g| g.kind == GapKind::LikelyDeletion).count(),
            significant_gaps: gaps.iter().filter(|g| g.kind == GapKind::Significant).count(),
            largest_gap,
            gaps,
        }
    }

    #[test]
    fn test_confidence_levels() {
        assert_eq!(ConfidenceLevel::from_score(100), ConfidenceLevel::VeryHigh);
        assert_eq!(ConfidenceLevel::from_score(90), ConfidenceLevel::VeryHigh);
        assert_eq!(ConfidenceLevel::from_score(75), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(60), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(40), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(39), ConfidenceLevel::VeryLow);
    }

    #[test]
    fn test_sequence_points() {
        assert_eq!(sequence_points(&sequence(vec![], true)), 40);
        let gap = |size| Gap {
            start_id: 1,
            end_id: 2 + size as i32,
            gap_size: size,
            kind: GapKind::Significant,
            index: 0,
        };
        assert_eq!(sequence_points(&sequence(vec![gap(3)], true)), 37);
        assert_eq!(sequence_points(&sequence(vec![gap(500)], false)), 20);
    }

    #[test]
    fn test_sequence_report_conversion() {
        let report = ValidationReport::from(&sequence(vec![], true));
        assert!(report.passed());
        assert_eq!(report.confidence_score, 1.0);
    }

    #[test]
    fn test_border_comparison_conversion() {
        let c = BorderComparison {
            channel: "@c".into(),
            date: NaiveDate::from_ymd_opt(2025, 9, 14).unwrap(),
            cached_first_id: Some(10),
            live_first_id: Some(9),
            matches: false,
        };
        let report = ValidationReport::from(&c);
        assert_eq!(report.status, ValidationStatus::Unverified);
        assert_eq!(report.discrepancies.len(), 1);
    }

    #[test]
    fn test_border_check_serializes_tagged() {
        let json = serde_json::to_value(BorderCheck::Failed {
            issues: vec![5],
            checked: 3,
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["issues"][0], 5);
    }
}
