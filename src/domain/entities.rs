//! Domain entities. Pure data structures for the core business.
//!
//! No Telegram/IO types here; adapters map into these.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format of the localized `date_msk` timestamp string.
pub const LOCAL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Text prefixes added to messages that carry media. Stripped before comparing with live text.
pub const MEDIA_MARKERS: [&str; 3] = ["📷 [Photo]", "📎 [File]", "📦 [Media]"];

/// A resolved channel (or any peer we read history from).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: i64,
    pub username: Option<String>,
    pub title: String,
}

/// Kind of media attached to a message; decides the text marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    File,
    Other,
}

impl MediaKind {
    pub fn marker(self) -> &'static str {
        match self {
            MediaKind::Photo => MEDIA_MARKERS[0],
            MediaKind::File => MEDIA_MARKERS[1],
            MediaKind::Other => MEDIA_MARKERS[2],
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Photo => "jpg",
            MediaKind::File | MediaKind::Other => "bin",
        }
    }

    /// Detect the kind from an already-marked message text.
    pub fn from_marked_text(text: &str) -> Option<Self> {
        [MediaKind::Photo, MediaKind::File, MediaKind::Other]
            .into_iter()
            .find(|k| text.starts_with(k.marker()))
    }
}

/// A single cached message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i32,
    pub date_utc: DateTime<Utc>,
    /// Localized timestamp, `YYYY-MM-DD HH:MM:SS` in the configured fixed offset.
    pub date_msk: String,
    pub text: String,
    pub sender: String,
    pub views: Option<i32>,
    pub forwards: Option<i32>,
    pub reply_to_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_info: Option<MediaInfo>,
}

impl Message {
    /// Parsed `date_msk`. None when the cached string is malformed.
    pub fn local_datetime(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.date_msk, LOCAL_DATETIME_FORMAT).ok()
    }

    pub fn local_date(&self) -> Option<NaiveDate> {
        self.local_datetime().map(|dt| dt.date())
    }

    /// `HH:MM:SS` part of `date_msk` (empty when absent).
    pub fn local_time_str(&self) -> &str {
        self.date_msk.split_once(' ').map(|(_, t)| t).unwrap_or("")
    }

    /// True when `date_msk` lies on `date`.
    pub fn is_on(&self, date: NaiveDate) -> bool {
        self.date_msk.starts_with(&date.format("%Y-%m-%d").to_string())
    }

    pub fn text_preview(&self, max_chars: usize) -> String {
        preview(&self.text, max_chars)
    }
}

/// Truncate to `max_chars` characters, appending `...` when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

/// Remove media markers and surrounding whitespace.
pub fn strip_media_markers(text: &str) -> String {
    let mut out = text.to_string();
    for marker in MEDIA_MARKERS {
        out = out.replace(marker, "");
    }
    out.trim().to_string()
}

/// Prefix `text` with the marker for `kind`, trimming like the cached form.
pub fn with_media_marker(text: &str, kind: MediaKind) -> String {
    format!("{} {}", kind.marker(), text).trim().to_string()
}

/// Render a UTC instant as a `date_msk` string in `offset`.
pub fn format_local(date_utc: DateTime<Utc>, offset: FixedOffset) -> String {
    date_utc
        .with_timezone(&offset)
        .format(LOCAL_DATETIME_FORMAT)
        .to_string()
}

/// Channel name without `@`, with `/` replaced; used in file names and anchor keys.
pub fn clean_channel(channel: &str) -> String {
    channel.replace('@', "").replace('/', "_")
}

/// Channel name with a leading `@`.
pub fn normalize_channel(channel: &str) -> String {
    if channel.starts_with('@') {
        channel.to_string()
    } else {
        format!("@{}", channel)
    }
}

/// Downloaded media attached to a verified message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub file_size: u64,
    /// SHA-256 hex digest of the file contents.
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_time: Option<DateTime<FixedOffset>>,
}

/// How the starting point of a fetch was chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    #[default]
    Manual,
    Anchor,
    ClosestAnchor,
    SmartOffset,
    LargeBatch,
    TimeRange,
    Expanded,
}

impl std::fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FetchStrategy::Manual => "manual",
            FetchStrategy::Anchor => "anchor",
            FetchStrategy::ClosestAnchor => "closest_anchor",
            FetchStrategy::SmartOffset => "smart_offset",
            FetchStrategy::LargeBatch => "large_batch",
            FetchStrategy::TimeRange => "time_range",
            FetchStrategy::Expanded => "expanded",
        };
        f.write_str(s)
    }
}

/// Direction in which a cache must grow to cover its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionDirection {
    Forward,
    Backward,
    Both,
}

impl ExpansionDirection {
    /// Combine an existing requirement with a new one.
    pub fn merge(current: Option<Self>, next: Self) -> Self {
        match (current, next) {
            (None, n) => n,
            (Some(c), n) if c == n => c,
            _ => ExpansionDirection::Both,
        }
    }

    pub fn forward(self) -> bool {
        matches!(self, ExpansionDirection::Forward | ExpansionDirection::Both)
    }

    pub fn backward(self) -> bool {
        matches!(self, ExpansionDirection::Backward | ExpansionDirection::Both)
    }
}

impl std::fmt::Display for ExpansionDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExpansionDirection::Forward => "forward",
            ExpansionDirection::Backward => "backward",
            ExpansionDirection::Both => "both",
        };
        f.write_str(s)
    }
}

/// Time window a snapshot was fetched for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRangeMeta {
    pub filter: String,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub scan_completed: bool,
    pub total_scanned: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionDetails {
    pub direction: ExpansionDirection,
    pub steps_requested: usize,
    pub messages_added: usize,
    pub original_cache: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionMeta {
    pub corrections_applied: usize,
    pub corrected_at: DateTime<FixedOffset>,
    pub original_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMeta {
    pub archived_at: DateTime<FixedOffset>,
    pub archive_date: NaiveDate,
    pub persistence_version: String,
}

/// Metadata of one snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub channel: String,
    pub cached_at: DateTime<FixedOffset>,
    pub total_messages: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_requested: Option<usize>,
    #[serde(default)]
    pub offset_id: i32,
    #[serde(default)]
    pub original_offset_id: i32,
    #[serde(default)]
    pub fetch_strategy: FetchStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRangeMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expansion: Option<ExpansionDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<CorrectionMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<ArchiveMeta>,
}

/// One fetch result: metadata plus messages, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub messages: Vec<Message>,
}

impl Snapshot {
    pub fn new(
        channel: &str,
        cached_at: DateTime<FixedOffset>,
        fetch_strategy: FetchStrategy,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            meta: SnapshotMeta {
                channel: channel.to_string(),
                cached_at,
                total_messages: messages.len(),
                limit_requested: None,
                offset_id: 0,
                original_offset_id: 0,
                fetch_strategy,
                suffix: None,
                time_range: None,
                expansion: None,
                correction: None,
                archive: None,
            },
            messages,
        }
    }

    /// Newest cached message.
    pub fn latest(&self) -> Option<&Message> {
        self.messages.first()
    }

    /// Oldest cached message.
    pub fn earliest(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Boundary message recorded for a (channel, date), used to resume fetching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub message_id: i64,
    /// `HH:MM:SS` of the anchor message.
    pub timestamp: String,
    /// ISO date (`YYYY-MM-DD`).
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<FixedOffset>>,
    #[serde(default = "default_anchor_version")]
    pub anchor_version: String,
}

fn default_anchor_version() -> String {
    "1.0".to_string()
}

/// Anchor together with the channel it belongs to (for listings).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorEntry {
    pub channel: String,
    #[serde(flatten)]
    pub anchor: Anchor,
}

/// Starting point chosen for a fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchOffset {
    pub strategy: FetchStrategy,
    pub offset_id: i32,
    pub reason: String,
    pub anchor: Option<Anchor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str) -> Message {
        Message {
            id: 1,
            date_utc: "2025-09-14T05:00:00Z".parse().unwrap(),
            date_msk: "2025-09-14 08:00:00".to_string(),
            text: text.to_string(),
            sender: "Unknown".to_string(),
            views: None,
            forwards: None,
            reply_to_id: None,
            media_info: None,
        }
    }

    #[test]
    fn test_strip_media_markers() {
        assert_eq!(strip_media_markers("📷 [Photo] look"), "look");
        assert_eq!(strip_media_markers("📎 [File]"), "");
        assert_eq!(strip_media_markers("plain"), "plain");
    }

    #[test]
    fn test_with_media_marker_trims_empty_text() {
        assert_eq!(with_media_marker("", MediaKind::Photo), "📷 [Photo]");
        assert_eq!(with_media_marker("hi", MediaKind::Other), "📦 [Media] hi");
        assert_eq!(
            MediaKind::from_marked_text("📎 [File] report.pdf"),
            Some(MediaKind::File)
        );
    }

    #[test]
    fn test_format_local_uses_offset() {
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        let utc: DateTime<Utc> = "2025-09-14T21:30:00Z".parse().unwrap();
        assert_eq!(format_local(utc, offset), "2025-09-15 00:30:00");
    }

    #[test]
    fn test_message_local_parts() {
        let m = msg("hello");
        assert_eq!(m.local_time_str(), "08:00:00");
        assert_eq!(m.local_date(), NaiveDate::from_ymd_opt(2025, 9, 14));
        assert!(m.is_on(NaiveDate::from_ymd_opt(2025, 9, 14).unwrap()));
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(clean_channel("@ai/club"), "ai_club");
        assert_eq!(normalize_channel("aiclub"), "@aiclub");
        assert_eq!(normalize_channel("@aiclub"), "@aiclub");
    }

    #[test]
    fn test_expansion_merge() {
        use ExpansionDirection::*;
        assert_eq!(ExpansionDirection::merge(None, Forward), Forward);
        assert_eq!(ExpansionDirection::merge(Some(Forward), Backward), Both);
        assert_eq!(ExpansionDirection::merge(Some(Backward), Backward), Backward);
        assert!(Both.forward() && Both.backward());
    }

    #[test]
    fn test_snapshot_roundtrip_keeps_optional_meta_out() {
        let cached_at = DateTime::parse_from_rfc3339("2025-09-14T10:00:00+03:00").unwrap();
        let snap = Snapshot::new("@aiclub", cached_at, FetchStrategy::Anchor, vec![msg("x")]);
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"fetch_strategy\":\"anchor\""));
        assert!(!json.contains("expansion"));
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
