//! Telegram adapter (teloxide).
//!
//! This crate implements the `modbot-core` ModerationPlatform over the
//! Telegram Bot API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::{
    prelude::*,
    types::{ChatMemberKind, ChatPermissions},
};
use tokio::time::sleep;

pub mod handlers;
pub mod history;
pub mod router;

use modbot_core::{
    domain::{ChatId, ChatMessage, MemberStatus, MessageId, MessageRef, UserId},
    errors::Error,
    ports::ModerationPlatform,
    Result,
};

use crate::history::RecentMessages;

#[derive(Clone)]
pub struct TelegramPlatform {
    bot: Bot,
    history: Arc<RecentMessages>,
}

impl TelegramPlatform {
    pub fn new(bot: Bot, history: Arc<RecentMessages>) -> Self {
        Self { bot, history }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    pub fn history(&self) -> &RecentMessages {
        &self.history
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn tg_user(user_id: UserId) -> Result<teloxide::types::UserId> {
        u64::try_from(user_id.0)
            .map(teloxide::types::UserId)
            .map_err(|_| Error::External(format!("invalid telegram user id: {}", user_id.0)))
    }
}

/// Resends allowed after a flood-control `RetryAfter` reply.
const RETRIES: usize = 1;
/// Restrict, ban and delete are never resent automatically.
const ENFORCEMENT_RETRIES: usize = 0;

fn map_err(e: teloxide::RequestError) -> Error {
    Error::External(format!("telegram error: {e}"))
}

async fn with_retry<T, Fut>(max_retries: usize, mut op: impl FnMut() -> Fut) -> Result<T>
where
    Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
    Fut::IntoFuture: Send,
{
    let mut attempts = 0usize;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => match e {
                teloxide::RequestError::RetryAfter(d) if attempts < max_retries => {
                    attempts += 1;
                    sleep(d).await;
                    continue;
                }
                other => return Err(map_err(other)),
            },
        }
    }
}

pub fn member_status(kind: &ChatMemberKind) -> MemberStatus {
    match kind {
        ChatMemberKind::Owner(_) => MemberStatus::Owner,
        ChatMemberKind::Administrator(_) => MemberStatus::Administrator,
        ChatMemberKind::Member => MemberStatus::Member,
        ChatMemberKind::Restricted(_) => MemberStatus::Restricted,
        ChatMemberKind::Left => MemberStatus::Left,
        ChatMemberKind::Banned(_) => MemberStatus::Banned,
    }
}

#[async_trait]
impl ModerationPlatform for TelegramPlatform {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let msg = with_retry(RETRIES, || {
            self.bot.send_message(Self::tg_chat(chat_id), text.to_string())
        })
        .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_message(&self, msg: MessageRef, text: &str) -> Result<()> {
        with_retry(RETRIES, || {
            self.bot.edit_message_text(
                Self::tg_chat(msg.chat_id),
                Self::tg_msg_id(msg.message_id),
                text.to_string(),
            )
        })
        .await?;
        Ok(())
    }

    async fn delete_messages(&self, chat_id: ChatId, message_ids: &[MessageId]) -> Result<usize> {
        let mut deleted = Vec::with_capacity(message_ids.len());
        let mut last_err = None;
        for &id in message_ids {
            match with_retry(ENFORCEMENT_RETRIES, || {
                self.bot.delete_message(Self::tg_chat(chat_id), Self::tg_msg_id(id))
            })
            .await
            {
                Ok(_) => deleted.push(id),
                Err(e) => {
                    tracing::warn!(chat_id = chat_id.0, message_id = id.0, "delete failed: {e}");
                    last_err = Some(e);
                }
            }
        }
        self.history.forget(chat_id, &deleted);

        // All attempts failing is an error; partial success is reported as a count.
        match last_err {
            Some(e) if deleted.is_empty() => Err(e),
            _ => Ok(deleted.len()),
        }
    }

    async fn get_chat_member(&self, chat_id: ChatId, user_id: UserId) -> Result<MemberStatus> {
        let user = Self::tg_user(user_id)?;
        let member = with_retry(RETRIES, || {
            self.bot.get_chat_member(Self::tg_chat(chat_id), user)
        })
        .await?;
        Ok(member_status(&member.kind))
    }

    async fn get_chat_history(&self, chat_id: ChatId, limit: usize) -> Result<Vec<ChatMessage>> {
        Ok(self.history.recent(chat_id, limit))
    }

    async fn restrict_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let user = Self::tg_user(user_id)?;
        with_retry(ENFORCEMENT_RETRIES, || {
            let req = self.bot.restrict_chat_member(
                Self::tg_chat(chat_id),
                user,
                ChatPermissions::empty(),
            );
            match until {
                Some(until) => req.until_date(until),
                None => req,
            }
        })
        .await?;
        Ok(())
    }

    async fn ban_member(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        let user = Self::tg_user(user_id)?;
        with_retry(ENFORCEMENT_RETRIES, || {
            self.bot.ban_chat_member(Self::tg_chat(chat_id), user)
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    type Reply = std::result::Result<(), teloxide::RequestError>;

    fn flood_limited(calls: &AtomicUsize) -> std::future::Ready<Reply> {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Err(teloxide::RequestError::RetryAfter(Duration::from_millis(1))))
    }

    #[tokio::test]
    async fn enforcement_is_not_resent_after_retry_after() {
        let calls = AtomicUsize::new(0);
        let res: Result<()> = with_retry(ENFORCEMENT_RETRIES, || flood_limited(&calls)).await;
        assert!(matches!(res, Err(Error::External(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn notices_are_resent_once_after_retry_after() {
        let calls = AtomicUsize::new(0);
        let res: Result<()> = with_retry(RETRIES, || flood_limited(&calls)).await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn privileged_kinds_map_to_privileged_status() {
        assert!(member_status(&ChatMemberKind::Member) == MemberStatus::Member);
        assert!(!member_status(&ChatMemberKind::Left).is_privileged());
    }

    #[test]
    fn negative_user_ids_are_rejected() {
        assert!(TelegramPlatform::tg_user(UserId(-5)).is_err());
        assert_eq!(
            TelegramPlatform::tg_user(UserId(42)).unwrap(),
            teloxide::types::UserId(42)
        );
    }
}
