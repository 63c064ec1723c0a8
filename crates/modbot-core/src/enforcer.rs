use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::{
    classifier::{ModerationAction, ModerationDecision},
    domain::{ChatId, MessageId, UserId},
    errors::Error,
    ports::ModerationPlatform,
    Result,
};

/// How far back DELETE looks for the target's messages.
pub const DELETE_HISTORY_SCAN: usize = 100;

/// Maps decisions onto platform mutations. Never retries.
pub struct Enforcer {
    platform: Arc<dyn ModerationPlatform>,
}

impl Enforcer {
    pub fn new(platform: Arc<dyn ModerationPlatform>) -> Self {
        Self { platform }
    }

    /// Apply `decision` to `user_id` in `chat_id`. Failures are reported to
    /// the chat and yield `false`.
    pub async fn apply(&self, chat_id: ChatId, user_id: UserId, decision: &ModerationDecision) -> bool {
        match self.try_apply(chat_id, user_id, decision).await {
            Ok(applied) => applied,
            Err(e) => {
                tracing::error!(
                    chat_id = chat_id.0,
                    user_id = user_id.0,
                    action = decision.action.as_str(),
                    "error applying moderation: {e}"
                );
                let notice = format!("⚠️ Moderation action failed: {e}");
                if let Err(send_err) = self.platform.send_message(chat_id, &notice).await {
                    tracing::warn!("failed to report enforcement error: {send_err}");
                }
                false
            }
        }
    }

    async fn try_apply(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        decision: &ModerationDecision,
    ) -> Result<bool> {
        match decision.action {
            ModerationAction::None => {
                tracing::debug!(
                    chat_id = chat_id.0,
                    user_id = user_id.0,
                    reason = %decision.reason,
                    "no action taken"
                );
                Ok(true)
            }
            ModerationAction::Mute => {
                let until = mute_until(Utc::now(), decision.duration_seconds);
                tracing::info!(
                    chat_id = chat_id.0,
                    user_id = user_id.0,
                    ?until,
                    reason = %decision.reason,
                    "restricting user"
                );
                self.platform
                    .restrict_member(chat_id, user_id, until)
                    .await
                    .map_err(enforcement)?;
                Ok(true)
            }
            ModerationAction::Ban => {
                tracing::info!(
                    chat_id = chat_id.0,
                    user_id = user_id.0,
                    reason = %decision.reason,
                    "banning user"
                );
                self.platform
                    .ban_member(chat_id, user_id)
                    .await
                    .map_err(enforcement)?;
                Ok(true)
            }
            ModerationAction::Delete => {
                let history = self
                    .platform
                    .get_chat_history(chat_id, DELETE_HISTORY_SCAN)
                    .await
                    .map_err(enforcement)?;
                let ids: Vec<MessageId> = history
                    .iter()
                    .filter(|m| m.sender.as_ref().is_some_and(|s| s.user_id == user_id))
                    .map(|m| m.message_id)
                    .collect();
                if ids.is_empty() {
                    tracing::info!(
                        chat_id = chat_id.0,
                        user_id = user_id.0,
                        "no messages found to delete"
                    );
                    return Ok(false);
                }
                let deleted = self
                    .platform
                    .delete_messages(chat_id, &ids)
                    .await
                    .map_err(enforcement)?;
                tracing::info!(
                    chat_id = chat_id.0,
                    user_id = user_id.0,
                    found = ids.len(),
                    deleted,
                    reason = %decision.reason,
                    "deleted user messages"
                );
                Ok(deleted > 0)
            }
        }
    }
}

/// `None` means indefinitely (duration 0).
pub fn mute_until(now: DateTime<Utc>, duration_seconds: u64) -> Option<DateTime<Utc>> {
    if duration_seconds == 0 {
        return None;
    }
    let secs = i64::try_from(duration_seconds).ok()?;
    now.checked_add_signed(ChronoDuration::try_seconds(secs)?)
}

fn enforcement(e: Error) -> Error {
    match e {
        Error::Enforcement(_) => e,
        other => Error::Enforcement(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{message, sender, FakePlatform, PlatformCall};
    use chrono::TimeZone;

    fn decision(action: ModerationAction) -> ModerationDecision {
        ModerationDecision {
            action,
            reason: "test".to_string(),
            duration_seconds: 0,
            warning_text: None,
            confidence: 0.9,
        }
    }

    #[test]
    fn mute_until_adds_duration() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            mute_until(now, 3600),
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).unwrap())
        );
    }

    #[test]
    fn zero_duration_is_indefinite() {
        assert_eq!(mute_until(Utc::now(), 0), None);
    }

    #[test]
    fn absurd_duration_is_indefinite() {
        assert_eq!(mute_until(Utc::now(), u64::MAX), None);
    }

    #[tokio::test]
    async fn delete_removes_only_the_targets_messages() {
        let platform = Arc::new(FakePlatform::new());
        {
            let mut h = platform.history.lock().unwrap();
            h.push(message(-100, 1, Some(sender(7, "Ann")), "buy"));
            h.push(message(-100, 2, Some(sender(8, "Bob")), "no"));
            h.push(message(-100, 3, Some(sender(7, "Ann")), "buy now"));
        }
        let enforcer = Enforcer::new(platform.clone());

        let ok = enforcer
            .apply(ChatId(-100), UserId(7), &decision(ModerationAction::Delete))
            .await;
        assert!(ok);
        assert_eq!(
            platform.calls(),
            vec![PlatformCall::Delete(
                ChatId(-100),
                vec![MessageId(1), MessageId(3)]
            )]
        );
    }

    #[tokio::test]
    async fn delete_without_messages_is_not_applied() {
        let platform = Arc::new(FakePlatform::new());
        let enforcer = Enforcer::new(platform.clone());
        let ok = enforcer
            .apply(ChatId(-100), UserId(7), &decision(ModerationAction::Delete))
            .await;
        assert!(!ok);
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn none_touches_nothing() {
        let platform = Arc::new(FakePlatform::new());
        let enforcer = Enforcer::new(platform.clone());
        assert!(
            enforcer
                .apply(ChatId(-100), UserId(7), &decision(ModerationAction::None))
                .await
        );
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn ban_failure_is_reported_once_and_not_retried() {
        let platform = Arc::new(FakePlatform::failing());
        let enforcer = Enforcer::new(platform.clone());
        let ok = enforcer
            .apply(ChatId(-100), UserId(7), &decision(ModerationAction::Ban))
            .await;
        assert!(!ok);
        let calls = platform.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], PlatformCall::Send(_, t) if t.contains("not enough rights")));
    }
}
