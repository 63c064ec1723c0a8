//! Classifier client: request assembly, reply grammar and safe fallback.

use std::{str::FromStr, sync::Arc, time::Duration};

use parking_lot::RwLock;

use crate::{
    context::ConversationContext,
    errors::Error,
    ports::{ClassifierPort, ClassifierRequest},
    prompts::{system_prompt, ModerationMode},
    Result,
};

pub const DEFAULT_CLASSIFIER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModerationAction {
    None,
    Mute,
    Ban,
    Delete,
}

impl ModerationAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ModerationAction::None => "none",
            ModerationAction::Mute => "mute",
            ModerationAction::Ban => "ban",
            ModerationAction::Delete => "delete",
        }
    }
}

impl FromStr for ModerationAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(ModerationAction::None),
            "mute" => Ok(ModerationAction::Mute),
            "ban" => Ok(ModerationAction::Ban),
            "delete" => Ok(ModerationAction::Delete),
            other => Err(Error::Parse(format!("unknown action: {other:?}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModerationDecision {
    pub action: ModerationAction,
    pub reason: String,
    /// 0 means permanent / indefinite.
    pub duration_seconds: u64,
    pub warning_text: Option<String>,
    /// Always within `0.0..=1.0`.
    pub confidence: f64,
}

impl ModerationDecision {
    /// Decision used whenever classification fails for any reason.
    pub fn safe_fallback(cause: impl std::fmt::Display) -> Self {
        Self {
            action: ModerationAction::None,
            reason: format!("Error processing message: {cause}"),
            duration_seconds: 0,
            warning_text: None,
            confidence: 0.0,
        }
    }
}

/// Parse the classifier reply grammar: one `KEY: value` per line.
///
/// Keys are case-insensitive; unknown keys are ignored; blank lines are
/// skipped. Any other deviation is an `Error::Parse`.
pub fn parse_decision(text: &str) -> Result<ModerationDecision> {
    if text.trim().is_empty() {
        return Err(Error::Parse("empty response".to_string()));
    }

    let mut action = ModerationAction::None;
    let mut reason: Option<String> = None;
    let mut duration_seconds = 0u64;
    let mut warning_text: Option<String> = None;
    let mut confidence = 0.0f64;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(Error::Parse(format!(
                "line {}: expected KEY: value, got {:?}",
                idx + 1,
                line
            )));
        };
        let key = key.trim().to_uppercase();
        let value = value.trim();
        if key.is_empty() {
            return Err(Error::Parse(format!("line {}: empty key", idx + 1)));
        }

        match key.as_str() {
            "ACTION" => action = value.parse()?,
            "REASON" => reason = Some(value.to_string()),
            "DURATION" => {
                duration_seconds = value.parse::<u64>().map_err(|e| {
                    Error::Parse(format!("invalid duration {value:?}: {e}"))
                })?;
            }
            "WARNING" => {
                warning_text = Some(value.to_string()).filter(|w| !w.is_empty());
            }
            "CONFIDENCE" => {
                let c = value.parse::<f64>().map_err(|e| {
                    Error::Parse(format!("invalid confidence {value:?}: {e}"))
                })?;
                if !(0.0..=1.0).contains(&c) {
                    return Err(Error::Parse(format!("confidence out of range: {c}")));
                }
                confidence = c;
            }
            _ => {}
        }
    }

    Ok(ModerationDecision {
        action,
        reason: reason
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "No reason provided".to_string()),
        duration_seconds,
        warning_text,
        confidence,
    })
}

/// Stateless classifier client: every call is a single system + user turn.
pub struct ClassifierClient {
    port: Arc<dyn ClassifierPort>,
    timeout: Duration,
    chat_rules: RwLock<Option<String>>,
    default_mode: RwLock<ModerationMode>,
}

impl ClassifierClient {
    pub fn new(port: Arc<dyn ClassifierPort>, timeout: Duration) -> Self {
        Self {
            port,
            timeout,
            chat_rules: RwLock::new(None),
            default_mode: RwLock::new(ModerationMode::General),
        }
    }

    /// Mode used for signals that do not suggest a specific prompt.
    pub fn default_mode(&self) -> ModerationMode {
        *self.default_mode.read()
    }

    pub fn set_default_mode(&self, mode: ModerationMode) {
        *self.default_mode.write() = mode;
    }

    /// Replace the extra rules appended to every system prompt.
    pub fn set_chat_rules(&self, rules: Option<String>) {
        *self.chat_rules.write() = rules.filter(|r| !r.trim().is_empty());
    }

    pub fn request_for(
        &self,
        context: &ConversationContext,
        trigger_method: &str,
        mode: ModerationMode,
    ) -> ClassifierRequest {
        let rules = self.chat_rules.read().clone();
        ClassifierRequest {
            system_prompt: system_prompt(mode, rules.as_deref()),
            transcript: context.transcript(),
            trigger_method: trigger_method.to_string(),
        }
    }

    /// Classify a conversation. Never fails: errors become a safe decision.
    pub async fn classify(
        &self,
        context: &ConversationContext,
        trigger_method: &str,
        mode: ModerationMode,
    ) -> ModerationDecision {
        let req = self.request_for(context, trigger_method, mode);
        tracing::debug!(method = trigger_method, mode = mode.as_str(), "classifying");

        match self.try_classify(&req).await {
            Ok(decision) => {
                tracing::info!(
                    action = decision.action.as_str(),
                    confidence = decision.confidence,
                    "classifier decision"
                );
                decision
            }
            Err(e) => {
                tracing::error!("classification failed: {e}");
                ModerationDecision::safe_fallback(e)
            }
        }
    }

    async fn try_classify(&self, req: &ClassifierRequest) -> Result<ModerationDecision> {
        let reply = tokio::time::timeout(self.timeout, self.port.complete(req))
            .await
            .map_err(|_| {
                Error::Classification(format!(
                    "classifier timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })??;
        tracing::debug!(reply = %reply, "classifier reply");
        parse_decision(&reply)
    }
}
