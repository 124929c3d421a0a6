//! Map Grammers types to domain entities.
//!
//! Extracts Message (with media marker, sender name, localized date) from grammers_client tl types.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Utc};
use grammers_client::tl;

use crate::domain::entities::{format_local, with_media_marker};
use crate::domain::{MediaKind, Message};

/// Display name: first name plus optional last name; "Unknown" without a first name.
pub fn display_name(first_name: Option<&str>, last_name: Option<&str>) -> String {
    let first = match first_name.map(str::trim) {
        Some(f) if !f.is_empty() => f,
        _ => return "Unknown".to_string(),
    };
    match last_name.map(str::trim) {
        Some(l) if !l.is_empty() => format!("{} {}", first, l),
        _ => first.to_string(),
    }
}

/// user id -> display name, from the `users` list of a history response.
pub fn sender_names(users: &[tl::enums::User]) -> HashMap<i64, String> {
    users
        .iter()
        .filter_map(|u| match u {
            tl::enums::User::User(u) => Some((
                u.id,
                display_name(u.first_name.as_deref(), u.last_name.as_deref()),
            )),
            tl::enums::User::Empty(_) => None,
        })
        .collect()
}

/// Map grammers Message to domain Message. Service and empty messages are skipped.
pub fn message_to_domain(
    msg: &tl::enums::Message,
    senders: &HashMap<i64, String>,
    offset: FixedOffset,
) -> Option<Message> {
    let m = match msg {
        tl::enums::Message::Message(m) => m,
        tl::enums::Message::Empty(_) | tl::enums::Message::Service(_) => return None,
    };

    let date_utc = DateTime::<Utc>::from_timestamp(i64::from(m.date), 0)?;
    let sender = m
        .from_id
        .as_ref()
        .and_then(|f| match f {
            tl::enums::Peer::User(u) => senders.get(&u.user_id).cloned(),
            _ => None,
        })
        .unwrap_or_else(|| "Unknown".to_string());
    let text = match media_kind(m) {
        Some(kind) => with_media_marker(&m.message, kind),
        None => m.message.clone(),
    };
    let reply_to_id = m
        .reply_to
        .as_ref()
        .and_then(|r| match r {
            tl::enums::MessageReplyHeader::Header(h) => Some(h.reply_to_msg_id),
            _ => None,
        })
        .flatten();

    Some(Message {
        id: m.id,
        date_utc,
        date_msk: format_local(date_utc, offset),
        text,
        sender,
        views: m.views,
        forwards: m.forwards,
        reply_to_id,
        media_info: None,
    })
}

fn media_kind(m: &tl::types::Message) -> Option<MediaKind> {
    match m.media.as_ref()? {
        tl::enums::MessageMedia::Photo(_) => Some(MediaKind::Photo),
        tl::enums::MessageMedia::Document(_) => Some(MediaKind::File),
        _ => Some(MediaKind::Other),
    }
}

/// Unpack any history-like response into (messages, users).
pub fn unpack_messages(
    raw: tl::enums::messages::Messages,
) -> (Vec<tl::enums::Message>, Vec<tl::enums::User>) {
    use tl::enums::messages::Messages;
    match raw {
        Messages::Messages(m) => (m.messages, m.users),
        Messages::Slice(m) => (m.messages, m.users),
        Messages::ChannelMessages(m) => (m.messages, m.users),
        Messages::NotModified(_) => (Vec::new(), Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(Some("Ada"), Some("Lovelace")), "Ada Lovelace");
        assert_eq!(display_name(Some("Ada"), None), "Ada");
        assert_eq!(display_name(Some("Ada"), Some("")), "Ada");
        assert_eq!(display_name(None, Some("Lovelace")), "Unknown");
        assert_eq!(display_name(Some(" "), None), "Unknown");
    }
}
