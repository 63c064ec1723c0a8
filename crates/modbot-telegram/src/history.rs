//! Bounded per-chat buffer of recently seen group messages.
//!
//! The Bot API has no "fetch history" call, so the adapter remembers what it
//! has received and serves context windows and DELETE enumeration from here.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use modbot_core::domain::{ChatId, ChatMessage, MessageId};

pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

#[derive(Debug)]
pub struct RecentMessages {
    capacity: usize,
    chats: Mutex<HashMap<ChatId, VecDeque<ChatMessage>>>,
}

impl Default for RecentMessages {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl RecentMessages {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            chats: Mutex::new(HashMap::new()),
        }
    }

    /// Remember `msg`. An edited message replaces the stored copy in place.
    pub fn record(&self, msg: ChatMessage) {
        let mut chats = self.chats.lock();
        let buf = chats.entry(msg.chat_id).or_default();
        if let Some(existing) = buf.iter_mut().find(|m| m.message_id == msg.message_id) {
            *existing = msg;
            return;
        }
        buf.push_back(msg);
        while buf.len() > self.capacity {
            buf.pop_front();
        }
    }

    /// Newest `limit` messages of `chat_id`, oldest first.
    pub fn recent(&self, chat_id: ChatId, limit: usize) -> Vec<ChatMessage> {
        let chats = self.chats.lock();
        let Some(buf) = chats.get(&chat_id) else {
            return Vec::new();
        };
        let skip = buf.len().saturating_sub(limit);
        buf.iter().skip(skip).cloned().collect()
    }

    /// Drop messages that no longer exist in the chat.
    pub fn forget(&self, chat_id: ChatId, ids: &[MessageId]) {
        let mut chats = self.chats.lock();
        if let Some(buf) = chats.get_mut(&chat_id) {
            buf.retain(|m| !ids.contains(&m.message_id));
        }
    }

    pub fn len(&self, chat_id: ChatId) -> usize {
        self.chats.lock().get(&chat_id).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(chat: i64, id: i32, text: &str) -> ChatMessage {
        ChatMessage {
            chat_id: ChatId(chat),
            message_id: MessageId(id),
            sender: None,
            text: Some(text.to_string()),
            entities: vec![],
            date: Utc::now(),
            reply_to_text: None,
        }
    }

    fn ids(msgs: &[ChatMessage]) -> Vec<i32> {
        msgs.iter().map(|m| m.message_id.0).collect()
    }

    #[test]
    fn keeps_only_the_newest_per_chat() {
        let h = RecentMessages::new(3);
        for id in 1..=5 {
            h.record(msg(-1, id, "x"));
        }
        h.record(msg(-2, 10, "other chat"));

        assert_eq!(ids(&h.recent(ChatId(-1), 10)), vec![3, 4, 5]);
        assert_eq!(ids(&h.recent(ChatId(-1), 2)), vec![4, 5]);
        assert_eq!(ids(&h.recent(ChatId(-2), 10)), vec![10]);
        assert!(h.recent(ChatId(-3), 10).is_empty());
    }

    #[test]
    fn edits_replace_in_place() {
        let h = RecentMessages::new(10);
        h.record(msg(-1, 1, "before"));
        h.record(msg(-1, 2, "next"));
        h.record(msg(-1, 1, "after"));

        let recent = h.recent(ChatId(-1), 10);
        assert_eq!(ids(&recent), vec![1, 2]);
        assert_eq!(recent[0].text.as_deref(), Some("after"));
    }

    #[test]
    fn forget_removes_deleted_messages() {
        let h = RecentMessages::new(10);
        for id in 1..=4 {
            h.record(msg(-1, id, "x"));
        }
        h.forget(ChatId(-1), &[MessageId(2), MessageId(4)]);
        assert_eq!(ids(&h.recent(ChatId(-1), 10)), vec![1, 3]);
        assert_eq!(h.len(ChatId(-1)), 2);
    }
}
