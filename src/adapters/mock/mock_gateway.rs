//! Mock chat gateway for testing without network calls.
//!
//! Holds one channel's history in memory and answers history, by-id and media
//! requests with the same id-window semantics as the real server.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{Duration, NaiveDateTime, TimeZone, Utc};
use tracing::info;

use crate::domain::entities::LOCAL_DATETIME_FORMAT;
use crate::domain::{ChannelRef, DomainError, Message};
use crate::ports::{ChatGateway, HistoryQuery};

pub struct MockGateway {
    channel: ChannelRef,
    /// Newest first.
    messages: RwLock<Vec<Message>>,
    media: RwLock<HashMap<i32, Vec<u8>>>,
    failing: AtomicBool,
    history_calls: AtomicUsize,
}

impl MockGateway {
    pub fn new(channel: &str, messages: Vec<Message>) -> Self {
        let gateway = Self {
            channel: ChannelRef {
                id: 1000,
                username: Some(channel.trim_start_matches('@').to_string()),
                title: channel.trim_start_matches('@').to_string(),
            },
            messages: RwLock::new(Vec::new()),
            media: RwLock::new(HashMap::new()),
            failing: AtomicBool::new(false),
            history_calls: AtomicUsize::new(0),
        };
        gateway.set_messages(messages);
        gateway
    }

    pub fn set_messages(&self, mut messages: Vec<Message>) {
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        if let Ok(mut guard) = self.messages.write() {
            *guard = messages;
        }
    }

    pub fn push(&self, message: Message) {
        let mut all = self.snapshot();
        all.push(message);
        self.set_messages(all);
    }

    pub fn remove(&self, id: i32) {
        if let Ok(mut guard) = self.messages.write() {
            guard.retain(|m| m.id != id);
        }
    }

    /// Change a live message in place (simulates edits).
    pub fn edit(&self, id: i32, f: impl FnOnce(&mut Message)) {
        if let Ok(mut guard) = self.messages.write() {
            if let Some(m) = guard.iter_mut().find(|m| m.id == id) {
                f(m);
            }
        }
    }

    pub fn set_media(&self, id: i32, bytes: Vec<u8>) {
        if let Ok(mut guard) = self.media.write() {
            guard.insert(id, bytes);
        }
    }

    /// Make every subsequent request fail with a gateway error.
    pub fn fail_requests(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> Vec<Message> {
        self.messages.read().map(|g| g.clone()).unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), DomainError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::Gateway("[MOCK] connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChatGateway for MockGateway {
    async fn resolve_channel(&self, channel: &str) -> Result<ChannelRef, DomainError> {
        self.check_available()?;
        let wanted = channel.trim_start_matches('@');
        match &self.channel.username {
            Some(u) if u.eq_ignore_ascii_case(wanted) => Ok(self.channel.clone()),
            _ => Err(DomainError::NotFound(format!("channel {} not found", channel))),
        }
    }

    async fn get_history(
        &self,
        _channel: &ChannelRef,
        query: HistoryQuery,
    ) -> Result<Vec<Message>, DomainError> {
        self.check_available()?;
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let out: Vec<Message> = self
            .snapshot()
            .into_iter()
            .filter(|m| query.admits(m.id))
            .take(query.limit)
            .collect();
        info!(?query, count = out.len(), "[MOCK] history");
        Ok(out)
    }

    async fn get_message(
        &self,
        _channel: &ChannelRef,
        message_id: i32,
    ) -> Result<Option<Message>, DomainError> {
        self.check_available()?;
        Ok(self.snapshot().into_iter().find(|m| m.id == message_id))
    }

    async fn download_media(
        &self,
        _channel: &ChannelRef,
        message_id: i32,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>, DomainError> {
        self.check_available()?;
        let bytes = match self.media.read().ok().and_then(|g| g.get(&message_id).cloned()) {
            Some(b) => b,
            None => return Ok(None),
        };
        let dir = dest_dir.join(format!("msg_{}", message_id));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DomainError::Media(e.to_string()))?;
        let path = dir.join(format!("{}.bin", message_id));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| DomainError::Media(e.to_string()))?;
        Ok(Some(path))
    }
}

/// Build a message whose `date_msk` is `local` (`YYYY-MM-DD HH:MM:SS` at +03:00).
pub fn message_at(id: i32, local: &str, text: &str) -> Message {
    let naive = NaiveDateTime::parse_from_str(local, LOCAL_DATETIME_FORMAT).unwrap_or_default();
    let date_utc = Utc.from_utc_datetime(&(naive - Duration::hours(3)));
    Message {
        id,
        date_utc,
        date_msk: local.to_string(),
        text: text.to_string(),
        sender: "Unknown".to_string(),
        views: Some(100),
        forwards: Some(1),
        reply_to_id: None,
        media_info: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> MockGateway {
        MockGateway::new(
            "@aiclub",
            (1..=20)
                .map(|i| message_at(i, &format!("2025-09-14 10:{:02}:00", i), "m"))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_history_window_semantics() {
        let gw = gateway();
        let ch = gw.resolve_channel("aiclub").await.unwrap();

        let latest = gw.get_history(&ch, HistoryQuery::latest(3)).await.unwrap();
        assert_eq!(latest.iter().map(|m| m.id).collect::<Vec<_>>(), vec![20, 19, 18]);

        let older = gw.get_history(&ch, HistoryQuery::before(5, 10)).await.unwrap();
        assert_eq!(older.iter().map(|m| m.id).collect::<Vec<_>>(), vec![4, 3, 2, 1]);

        let range = gw.get_history(&ch, HistoryQuery::between(9, 11, 10)).await.unwrap();
        assert_eq!(range.iter().map(|m| m.id).collect::<Vec<_>>(), vec![10]);
        assert_eq!(gw.history_calls(), 3);
    }

    #[tokio::test]
    async fn test_get_message_and_failure() {
        let gw = gateway();
        let ch = gw.resolve_channel("@aiclub").await.unwrap();
        assert!(gw.get_message(&ch, 7).await.unwrap().is_some());
        gw.remove(7);
        assert!(gw.get_message(&ch, 7).await.unwrap().is_none());

        gw.fail_requests(true);
        assert!(matches!(
            gw.get_message(&ch, 8).await,
            Err(DomainError::Gateway(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_channel() {
        let gw = gateway();
        assert!(matches!(
            gw.resolve_channel("@other").await,
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn test_message_at_converts_to_utc() {
        let m = message_at(1, "2025-09-14 08:00:00", "x");
        assert_eq!(m.date_utc.to_rfc3339(), "2025-09-14T05:00:00+00:00");
    }
}
