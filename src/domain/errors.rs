//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Telegram gateway error: {0}")]
    Gateway(String),

    #[error("Snapshot store error: {0}")]
    Store(String),

    #[error("Anchor store error: {0}")]
    Anchor(String),

    #[error("Daily archive error: {0}")]
    Archive(String),

    #[error("Report store error: {0}")]
    Report(String),

    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid date filter '{0}': use today, yesterday, last:N, YYYY-MM-DD or all")]
    InvalidFilter(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// No snapshot exists yet for the channel.
    #[error("No cache found for {0}; run `tg-cache fetch {0}` first")]
    NoCache(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Media verification failed: {0}")]
    Media(String),
}
