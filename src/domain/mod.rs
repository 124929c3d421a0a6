//! Core domain layer. No external I/O dependencies.
//!
//! Entities, date selectors and validation reports live here. Dependencies flow inward.

pub mod date_filter;
pub mod entities;
pub mod errors;
pub mod reports;

pub use date_filter::{DateFilter, DateWindow};
pub use entities::{
    Anchor, AnchorEntry, ChannelRef, ExpansionDirection, FetchOffset, FetchStrategy, MediaInfo,
    MediaKind, Message, Snapshot, SnapshotMeta,
};
pub use errors::DomainError;
pub use reports::{ValidationReport, ValidationStatus};
