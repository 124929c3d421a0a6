//! Implements ChatGateway using grammers Client.
//!
//! Handles FloodWait by sleeping and retrying. Uses raw invoke for GetHistory
//! (offset/min/max ids) and GetMessages (by id).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::FixedOffset;
use grammers_client::peer::Peer;
use grammers_client::tl;
use grammers_client::{Client, InvocationError};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::adapters::telegram::mapper;
use crate::domain::{ChannelRef, DomainError, MediaKind, Message};
use crate::ports::{ChatGateway, HistoryQuery};

const FLOOD_WAIT_ATTEMPTS: u32 = 3;

/// Raw requests this gateway sends; all answer with `messages::Messages`.
enum MessagesRequest {
    History(tl::functions::messages::GetHistory),
    Channel(tl::functions::channels::GetMessages),
    Direct(tl::functions::messages::GetMessages),
}

/// Telegram gateway adapter over an authorized grammers Client.
pub struct GrammersGateway {
    client: Client,
    /// Offset used to render `date_msk`.
    offset: FixedOffset,
    /// If set, sleep this many ms before each history request (rate limiting).
    export_delay_ms: Option<u64>,
    /// Cache InputPeer by channel id so we don't call iter_dialogs on every request (avoids FLOOD_WAIT).
    peer_cache: Mutex<HashMap<i64, tl::enums::InputPeer>>,
}

impl GrammersGateway {
    pub fn new(client: Client, offset: FixedOffset, export_delay_ms: Option<u64>) -> Self {
        Self {
            client,
            offset,
            export_delay_ms,
            peer_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Walk dialogs until one matches `channel` (username, with or without `@`, or numeric id).
    async fn find_peer(&self, channel: &str) -> Result<Peer, DomainError> {
        let wanted = channel.trim_start_matches('@');
        let wanted_id = wanted.parse::<i64>().ok();
        let mut dialogs = self.client.iter_dialogs();
        while let Some(dialog) = dialogs
            .next()
            .await
            .map_err(|e| DomainError::Gateway(e.to_string()))?
        {
            let p = dialog.peer();
            let id_match = wanted_id == Some(p.id().bot_api_dialog_id());
            let name_match = p
                .username()
                .is_some_and(|u| u.eq_ignore_ascii_case(wanted));
            if id_match || name_match {
                return Ok(p.clone());
            }
        }
        Err(DomainError::NotFound(format!(
            "channel {} not found in dialogs",
            channel
        )))
    }

    async fn input_peer(&self, channel: &ChannelRef) -> Result<tl::enums::InputPeer, DomainError> {
        if let Some(peer) = self.peer_cache.lock().await.get(&channel.id) {
            return Ok(peer.clone());
        }
        let peer = self.find_peer(&channel.id.to_string()).await?;
        self.cache_peer(channel.id, &peer).await
    }

    async fn cache_peer(
        &self,
        id: i64,
        peer: &Peer,
    ) -> Result<tl::enums::InputPeer, DomainError> {
        let peer_ref = peer
            .to_ref()
            .await
            .ok_or_else(|| DomainError::Gateway("peer not in session cache".into()))?;
        let input_peer: tl::enums::InputPeer = peer_ref.into();
        self.peer_cache.lock().await.insert(id, input_peer.clone());
        Ok(input_peer)
    }

    /// Send one request, sleeping through FloodWait up to a few times.
    async fn invoke(
        &self,
        req: &MessagesRequest,
    ) -> Result<tl::enums::messages::Messages, DomainError> {
        for attempt in 0..FLOOD_WAIT_ATTEMPTS {
            let result = match req {
                MessagesRequest::History(r) => self.client.invoke(r).await,
                MessagesRequest::Channel(r) => self.client.invoke(r).await,
                MessagesRequest::Direct(r) => self.client.invoke(r).await,
            };
            match result {
                Ok(raw) => return Ok(raw),
                Err(InvocationError::Rpc(rpc)) if rpc.code == 420 => {
                    let wait_secs = rpc.value.unwrap_or(60) as u64;
                    warn!(attempt, wait_secs, "FloodWait, sleeping");
                    tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                }
                Err(e) => return Err(DomainError::Gateway(e.to_string())),
            }
        }
        Err(DomainError::Gateway("FloodWait max retries".into()))
    }

    fn map_all(&self, raw: tl::enums::messages::Messages) -> Vec<Message> {
        let (messages, users) = mapper::unpack_messages(raw);
        let senders = mapper::sender_names(&users);
        messages
            .iter()
            .filter_map(|m| mapper::message_to_domain(m, &senders, self.offset))
            .collect()
    }
}

#[async_trait]
impl ChatGateway for GrammersGateway {
    async fn resolve_channel(&self, channel: &str) -> Result<ChannelRef, DomainError> {
        let peer = self.find_peer(channel).await?;
        let id = peer.id().bot_api_dialog_id();
        let channel_ref = ChannelRef {
            id,
            username: peer.username().map(String::from),
            title: peer
                .name()
                .map(String::from)
                .unwrap_or_else(|| channel.to_string()),
        };
        self.cache_peer(id, &peer).await?;
        debug!(channel, id, "resolved channel");
        Ok(channel_ref)
    }

    async fn get_history(
        &self,
        channel: &ChannelRef,
        query: HistoryQuery,
    ) -> Result<Vec<Message>, DomainError> {
        if let Some(ms) = self.export_delay_ms.filter(|ms| *ms > 0) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        let peer = self.input_peer(channel).await?;
        let req = MessagesRequest::History(tl::functions::messages::GetHistory {
            peer,
            offset_id: query.offset_id,
            offset_date: 0,
            add_offset: 0,
            limit: i32::try_from(query.limit).unwrap_or(i32::MAX),
            max_id: query.max_id,
            min_id: query.min_id,
            hash: 0,
        });
        let raw = self.invoke(&req).await?;
        let mut out = self.map_all(raw);
        // The server may pad the page; keep only ids inside the requested window.
        out.retain(|m| query.admits(m.id));
        out.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(out)
    }

    async fn get_message(
        &self,
        channel: &ChannelRef,
        message_id: i32,
    ) -> Result<Option<Message>, DomainError> {
        let peer = self.input_peer(channel).await?;
        let id = vec![tl::enums::InputMessage::Id(tl::types::InputMessageId {
            id: message_id,
        })];
        let req = match peer {
            tl::enums::InputPeer::Channel(c) => {
                MessagesRequest::Channel(tl::functions::channels::GetMessages {
                    channel: tl::enums::InputChannel::Channel(tl::types::InputChannel {
                        channel_id: c.channel_id,
                        access_hash: c.access_hash,
                    }),
                    id,
                })
            }
            _ => MessagesRequest::Direct(tl::functions::messages::GetMessages { id }),
        };
        let raw = self.invoke(&req).await?;
        Ok(self
            .map_all(raw)
            .into_iter()
            .find(|m| m.id == message_id))
    }

    async fn download_media(
        &self,
        channel: &ChannelRef,
        message_id: i32,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>, DomainError> {
        let kind = match self.get_message(channel, message_id).await? {
            Some(m) => MediaKind::from_marked_text(&m.text),
            None => return Err(DomainError::Media("message not found".into())),
        };
        let Some(kind) = kind else {
            return Ok(None);
        };

        let peer = self.find_peer(&channel.id.to_string()).await?;
        let peer_ref = peer
            .to_ref()
            .await
            .ok_or_else(|| DomainError::Media("peer not in session cache".into()))?;
        let messages = self
            .client
            .get_messages_by_id(peer_ref, &[message_id])
            .await
            .map_err(|e| DomainError::Media(e.to_string()))?;
        let msg = messages
            .into_iter()
            .next()
            .and_then(|o| o)
            .ok_or_else(|| DomainError::Media("message not found".into()))?;
        let Some(media) = msg.media() else {
            return Ok(None);
        };

        let dir = dest_dir.join(format!("msg_{}", message_id));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DomainError::Media(format!("create media dir: {}", e)))?;
        let dest_path = dir.join(format!("{}.{}", message_id, kind.extension()));
        self.client
            .download_media(&media, &dest_path)
            .await
            .map_err(|e| DomainError::Media(e.to_string()))?;

        debug!(
            channel_id = channel.id,
            msg_id = message_id,
            path = %dest_path.display(),
            "media downloaded"
        );
        Ok(Some(dest_path))
    }
}
