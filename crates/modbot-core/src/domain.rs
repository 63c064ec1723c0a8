use std::fmt;

use chrono::{DateTime, Utc};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub i32);

/// A stable reference to a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Identity of one candidate message under review: `chatId_userId_messageId`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageIdentity {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub message_id: MessageId,
}

impl fmt::Display for MessageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.chat_id.0, self.user_id.0, self.message_id.0
        )
    }
}

/// Sender of a chat message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub is_bot: bool,
}

impl Sender {
    /// Display name, falling back to `@username`, then `"Unknown"`.
    pub fn name(&self) -> String {
        if let Some(n) = self.display_name.as_deref().map(str::trim) {
            if !n.is_empty() {
                return n.to_string();
            }
        }
        if let Some(u) = self.username.as_deref().map(str::trim) {
            if !u.is_empty() {
                return format!("@{u}");
            }
        }
        "Unknown".to_string()
    }
}

/// Structured entity attached to a message text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageEntity {
    /// Clickable text with a hidden URL.
    TextLink { url: String },
    Url,
    Mention,
    Other,
}

/// Platform-neutral chat message as seen by the pipeline.
#[derive(Clone, Debug)]
pub struct ChatMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub sender: Option<Sender>,
    pub text: Option<String>,
    pub entities: Vec<MessageEntity>,
    pub date: DateTime<Utc>,
    pub reply_to_text: Option<String>,
}

impl ChatMessage {
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn identity(&self) -> Option<MessageIdentity> {
        let sender = self.sender.as_ref()?;
        Some(MessageIdentity {
            chat_id: self.chat_id,
            user_id: sender.user_id,
            message_id: self.message_id,
        })
    }
}

/// Membership status of a user in a chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberStatus {
    Owner,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
}

impl MemberStatus {
    pub fn is_privileged(self) -> bool {
        matches!(self, MemberStatus::Owner | MemberStatus::Administrator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_formats_as_chat_user_message() {
        let id = MessageIdentity {
            chat_id: ChatId(123),
            user_id: UserId(456),
            message_id: MessageId(789),
        };
        assert_eq!(id.to_string(), "123_456_789");
    }

    #[test]
    fn sender_name_falls_back() {
        let mut s = Sender {
            user_id: UserId(1),
            display_name: Some("  ".to_string()),
            username: Some("alice".to_string()),
            is_bot: false,
        };
        assert_eq!(s.name(), "@alice");
        s.username = None;
        assert_eq!(s.name(), "Unknown");
        s.display_name = Some("Alice".to_string());
        assert_eq!(s.name(), "Alice");
    }
}
