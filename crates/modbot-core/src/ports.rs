//! Hexagonal ports consumed by the moderation pipeline.
//!
//! Telegram, the classification service and the pattern store are adapters
//! behind these traits; the pipeline never talks to a transport directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::{ChatId, ChatMessage, MemberStatus, MessageId, MessageRef, UserId},
    patterns::BannedPattern,
    Result,
};

/// Capability surface of the messaging platform.
#[async_trait]
pub trait ModerationPlatform: Send + Sync {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;
    async fn edit_message(&self, msg: MessageRef, text: &str) -> Result<()>;

    /// Delete messages in a chat. Returns how many were actually removed.
    async fn delete_messages(&self, chat_id: ChatId, message_ids: &[MessageId]) -> Result<usize>;

    async fn get_chat_member(&self, chat_id: ChatId, user_id: UserId) -> Result<MemberStatus>;

    /// Most recent `limit` messages of a chat, ordered oldest -> newest.
    async fn get_chat_history(&self, chat_id: ChatId, limit: usize) -> Result<Vec<ChatMessage>>;

    /// Revoke all send permissions. `until = None` means indefinitely.
    async fn restrict_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn ban_member(&self, chat_id: ChatId, user_id: UserId) -> Result<()>;
}

/// One classification request: fixed policy text plus the transcript turn.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassifierRequest {
    pub system_prompt: String,
    pub transcript: String,
    pub trigger_method: String,
}

impl ClassifierRequest {
    /// The user turn sent alongside the system prompt.
    pub fn user_turn(&self) -> String {
        format!(
            "Analyze this conversation and make a decision according to the rules.\n\
Detection method (hint only): {}\n\n{}",
            self.trigger_method, self.transcript
        )
    }
}

/// External classification service (an LLM endpoint in production).
#[async_trait]
pub trait ClassifierPort: Send + Sync {
    /// Send one request and return the raw textual reply.
    async fn complete(&self, req: &ClassifierRequest) -> Result<String>;
}

/// Backing store of banned behavior patterns.
#[async_trait]
pub trait PatternStore: Send + Sync {
    async fn list_banned_patterns(&self) -> Result<Vec<BannedPattern>>;
}
