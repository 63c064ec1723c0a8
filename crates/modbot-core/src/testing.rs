//! Hand-written fakes shared by the pipeline tests.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use crate::{
    domain::{ChatId, ChatMessage, MemberStatus, MessageId, MessageRef, Sender, UserId},
    patterns::BannedPattern,
    ports::{ClassifierPort, ClassifierRequest, ModerationPlatform, PatternStore},
    Error, Result,
};

pub fn sender(user_id: i64, name: &str) -> Sender {
    Sender {
        user_id: UserId(user_id),
        display_name: Some(name.to_string()),
        username: None,
        is_bot: false,
    }
}

pub fn message(chat: i64, id: i32, from: Option<Sender>, text: &str) -> ChatMessage {
    ChatMessage {
        chat_id: ChatId(chat),
        message_id: MessageId(id),
        sender: from,
        text: Some(text.to_string()),
        entities: vec![],
        date: Utc::now(),
        reply_to_text: None,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlatformCall {
    Send(ChatId, String),
    Edit(MessageRef, String),
    Delete(ChatId, Vec<MessageId>),
    Restrict(ChatId, UserId, Option<DateTime<Utc>>),
    Ban(ChatId, UserId),
}

/// Records every mutating call; lookups are served from fixed state.
pub struct FakePlatform {
    pub calls: Mutex<Vec<PlatformCall>>,
    pub history: Mutex<Vec<ChatMessage>>,
    pub member_status: Mutex<Option<MemberStatus>>,
    pub member_lookups: AtomicUsize,
    pub fail_enforcement: bool,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
            member_status: Mutex::new(Some(MemberStatus::Member)),
            member_lookups: AtomicUsize::new(0),
            fail_enforcement: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_enforcement: true,
            ..Self::new()
        }
    }

    pub fn with_status(self, status: Option<MemberStatus>) -> Self {
        *self.member_status.lock().unwrap() = status;
        self
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PlatformCall::Send(_, t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn restricts(&self) -> Vec<(UserId, Option<DateTime<Utc>>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PlatformCall::Restrict(_, u, until) => Some((u, until)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: PlatformCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn enforcement_result(&self) -> Result<()> {
        if self.fail_enforcement {
            Err(Error::External("not enough rights".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ModerationPlatform for FakePlatform {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.record(PlatformCall::Send(chat_id, text.to_string()));
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(1000),
        })
    }

    async fn edit_message(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.record(PlatformCall::Edit(msg, text.to_string()));
        Ok(())
    }

    async fn delete_messages(&self, chat_id: ChatId, message_ids: &[MessageId]) -> Result<usize> {
        self.enforcement_result()?;
        self.record(PlatformCall::Delete(chat_id, message_ids.to_vec()));
        Ok(message_ids.len())
    }

    async fn get_chat_member(&self, _chat_id: ChatId, _user_id: UserId) -> Result<MemberStatus> {
        self.member_lookups.fetch_add(1, Ordering::SeqCst);
        self.member_status
            .lock()
            .unwrap()
            .ok_or_else(|| Error::External("member lookup failed".to_string()))
    }

    async fn get_chat_history(&self, chat_id: ChatId, limit: usize) -> Result<Vec<ChatMessage>> {
        let history = self.history.lock().unwrap();
        let in_chat: Vec<_> = history
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect();
        let skip = in_chat.len().saturating_sub(limit);
        Ok(in_chat.into_iter().skip(skip).collect())
    }

    async fn restrict_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.enforcement_result()?;
        self.record(PlatformCall::Restrict(chat_id, user_id, until));
        Ok(())
    }

    async fn ban_member(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        self.enforcement_result()?;
        self.record(PlatformCall::Ban(chat_id, user_id));
        Ok(())
    }
}

/// Replies with a fixed text. With a gate, each call signals `entered` and
/// then waits for `release` before answering.
pub struct FakeClassifier {
    reply: String,
    pub seen: Mutex<Vec<ClassifierRequest>>,
    pub calls: AtomicUsize,
    gate: Option<(Notify, Notify)>,
}

impl FakeClassifier {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn gated(reply: &str) -> Self {
        Self {
            gate: Some((Notify::new(), Notify::new())),
            ..Self::replying(reply)
        }
    }

    pub async fn wait_entered(&self) {
        if let Some((entered, _)) = &self.gate {
            entered.notified().await;
        }
    }

    pub fn release(&self) {
        if let Some((_, release)) = &self.gate {
            release.notify_one();
        }
    }
}

#[async_trait]
impl ClassifierPort for FakeClassifier {
    async fn complete(&self, req: &ClassifierRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(req.clone());
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        Ok(self.reply.clone())
    }
}

pub struct FakeStore(pub Vec<BannedPattern>);

#[async_trait]
impl PatternStore for FakeStore {
    async fn list_banned_patterns(&self) -> Result<Vec<BannedPattern>> {
        Ok(self.0.clone())
    }
}
