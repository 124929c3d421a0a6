//! Port traits. API boundaries for the hexagon.
//!
//! Outbound only: called by use cases into infrastructure (Telegram, filesystem).

pub mod outbound;

pub use outbound::{
    AnchorMap, AnchorStore, ArchiveEntry, ArchiveStore, ChatGateway, HistoryQuery, ReportStore,
    SnapshotFile, SnapshotStore,
};
