//! Per-message orchestration: detect, deduplicate, classify, gate, enforce.

use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::{
    admin_cache::AdminExemptionCache,
    classifier::{ClassifierClient, ModerationAction, ModerationDecision},
    context::{ContextBuilder, DEFAULT_CONTEXT_WINDOW},
    detect::{behavior::BehaviorMatcher, link_ad::LinkAdDetector, ModerationSignal},
    domain::{ChatId, ChatMessage, MessageIdentity, Sender},
    enforcer::Enforcer,
    ports::ModerationPlatform,
    prompts::ModerationMode,
    settings::ChatSettingsStore,
    utils::{AuditEvent, AuditLogger},
};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

// ============== In-flight tracking ==============

/// Identities currently under review. At most one dispatch per identity.
#[derive(Debug, Default)]
pub struct InFlightSet {
    inner: Mutex<HashSet<MessageIdentity>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if the identity is already being processed.
    pub fn try_acquire(&self, identity: MessageIdentity) -> Option<InFlightGuard<'_>> {
        if !self.inner.lock().insert(identity) {
            return None;
        }
        Some(InFlightGuard {
            set: self,
            identity,
        })
    }

    pub fn contains(&self, identity: &MessageIdentity) -> bool {
        self.inner.lock().contains(identity)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Removes its identity from the set when dropped.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    set: &'a InFlightSet,
    identity: MessageIdentity,
}

impl InFlightGuard<'_> {
    pub fn identity(&self) -> MessageIdentity {
        self.identity
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.inner.lock().remove(&self.identity);
    }
}

// ============== Dispatcher ==============

/// Terminal state of one dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a candidate: no sender, bot sender, automod off, or no signal.
    Ignored,
    RejectedDuplicate,
    NeedsReview,
    NoAction,
    Exempt,
    Enforced,
    Failed,
}

pub struct Dispatcher {
    platform: Arc<dyn ModerationPlatform>,
    behavior: BehaviorMatcher,
    link_ad: LinkAdDetector,
    context: ContextBuilder,
    classifier: ClassifierClient,
    admins: AdminExemptionCache,
    in_flight: InFlightSet,
    enforcer: Enforcer,
    confidence_threshold: f64,
    settings: Arc<ChatSettingsStore>,
    audit: Option<AuditLogger>,
}

impl Dispatcher {
    pub fn new(
        platform: Arc<dyn ModerationPlatform>,
        behavior: BehaviorMatcher,
        classifier: ClassifierClient,
        admins: AdminExemptionCache,
    ) -> Self {
        Self {
            enforcer: Enforcer::new(platform.clone()),
            platform,
            behavior,
            link_ad: LinkAdDetector::default(),
            context: ContextBuilder::new(DEFAULT_CONTEXT_WINDOW),
            classifier,
            admins,
            in_flight: InFlightSet::new(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            settings: Arc::new(ChatSettingsStore::in_memory()),
            audit: None,
        }
    }

    pub fn with_link_detector(mut self, detector: LinkAdDetector) -> Self {
        self.link_ad = detector;
        self
    }

    pub fn with_context_window(mut self, window: usize) -> Self {
        self.context = ContextBuilder::new(window);
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Prompt used when a signal does not suggest a more specific one.
    pub fn with_default_mode(self, mode: ModerationMode) -> Self {
        self.classifier.set_default_mode(mode);
        self
    }

    pub fn with_settings(mut self, settings: Arc<ChatSettingsStore>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn classifier(&self) -> &ClassifierClient {
        &self.classifier
    }

    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    /// Fire-and-forget entry point for the inbound message handler.
    pub fn on_candidate_message(self: &Arc<Self>, msg: ChatMessage) -> JoinHandle<DispatchOutcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.dispatch(msg).await })
    }

    pub async fn dispatch(&self, msg: ChatMessage) -> DispatchOutcome {
        let Some(sender) = msg.sender.clone() else {
            return DispatchOutcome::Ignored;
        };
        let Some(identity) = msg.identity() else {
            return DispatchOutcome::Ignored;
        };
        if sender.is_bot || !self.settings.automod_enabled(msg.chat_id) {
            return DispatchOutcome::Ignored;
        }

        let signal = self.detect(&msg).await;
        if !signal.is_triggered() {
            return DispatchOutcome::Ignored;
        }
        tracing::info!(
            %identity,
            method = %signal.method,
            reason = %signal.reason,
            "message flagged for review"
        );

        let Some(_guard) = self.in_flight.try_acquire(identity) else {
            tracing::info!(%identity, "message already in flight");
            self.notify(
                msg.chat_id,
                "⏳ This message is already being processed, please wait.",
            )
            .await;
            return DispatchOutcome::RejectedDuplicate;
        };

        self.review(&msg, &sender, identity, &signal).await
    }

    async fn detect(&self, msg: &ChatMessage) -> ModerationSignal {
        let text = msg.text_or_empty();

        let behavior = self.behavior.check(text).await;
        if behavior.triggered {
            return behavior.into_signal();
        }

        self.link_ad.detect(text, &msg.entities).into_signal()
    }

    async fn review(
        &self,
        msg: &ChatMessage,
        sender: &Sender,
        identity: MessageIdentity,
        signal: &ModerationSignal,
    ) -> DispatchOutcome {
        let chat_id = msg.chat_id;
        let recent = self.recent_with_trigger(msg).await;
        let ctx = self.context.build(&recent, Some(sender));

        let mode = match signal.mode {
            ModerationMode::General => self.classifier.default_mode(),
            specific => specific,
        };
        let decision = self.classifier.classify(&ctx, &signal.method, mode).await;

        if decision.confidence < self.confidence_threshold {
            tracing::info!(
                %identity,
                action = decision.action.as_str(),
                confidence = decision.confidence,
                "confidence below threshold, needs human review"
            );
            self.audit(AuditEvent::needs_review(
                identity,
                msg.text_or_empty(),
                decision.action.as_str(),
                &decision.reason,
                decision.confidence,
            ));
            let notice = format!(
                "🔍 Message from {} needs human review (confidence {:.2}).\nSuggested: {}. Reason: {}",
                sender.name(),
                decision.confidence,
                decision.action.as_str(),
                decision.reason
            );
            self.notify(chat_id, &notice).await;
            return DispatchOutcome::NeedsReview;
        }

        if decision.action == ModerationAction::None {
            tracing::debug!(%identity, reason = %decision.reason, "no action needed");
            return DispatchOutcome::NoAction;
        }

        if let Some(role) = self.exemption(chat_id, sender).await {
            tracing::info!(
                %identity,
                action = decision.action.as_str(),
                role,
                "target is exempt, skipping enforcement"
            );
            self.audit(AuditEvent::exempt(
                identity,
                decision.action.as_str(),
                &decision.reason,
            ));
            let notice = format!(
                "ℹ️ {} is a {role}, {} skipped.\nReason: {}",
                sender.name(),
                decision.action.as_str(),
                decision.reason
            );
            self.notify(chat_id, &notice).await;
            return DispatchOutcome::Exempt;
        }

        let applied = self.enforcer.apply(chat_id, sender.user_id, &decision).await;
        self.audit(AuditEvent::enforcement(
            identity,
            &signal.method,
            msg.text_or_empty(),
            decision.action.as_str(),
            &decision.reason,
            decision.confidence,
            applied,
        ));
        if !applied {
            return DispatchOutcome::Failed;
        }

        self.notify(chat_id, &enforcement_notice(&sender.name(), &decision))
            .await;
        if let Some(warning) = &decision.warning_text {
            self.notify(chat_id, &format!("⚠️ {warning}")).await;
        }
        DispatchOutcome::Enforced
    }

    /// Trusted members are checked locally before asking the platform.
    async fn exemption(&self, chat_id: ChatId, sender: &Sender) -> Option<&'static str> {
        if self.settings.is_trusted(chat_id, sender.user_id) {
            return Some("trusted user");
        }
        self.admins
            .resolve(self.platform.as_ref(), chat_id, sender.user_id)
            .await
            .then_some("chat administrator")
    }

    /// Recent history with the triggering message guaranteed to be last.
    async fn recent_with_trigger(&self, msg: &ChatMessage) -> Vec<ChatMessage> {
        let mut recent = match self
            .platform
            .get_chat_history(msg.chat_id, self.context.window())
            .await
        {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(chat_id = msg.chat_id.0, "failed to fetch history: {e}");
                Vec::new()
            }
        };
        recent.retain(|m| m.message_id != msg.message_id);
        recent.push(msg.clone());
        recent
    }

    async fn notify(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.platform.send_message(chat_id, text).await {
            tracing::warn!(chat_id = chat_id.0, "failed to send notice: {e}");
        }
    }

    fn audit(&self, event: AuditEvent) {
        if let Some(audit) = &self.audit {
            audit.record(event);
        }
    }
}

fn enforcement_notice(name: &str, decision: &ModerationDecision) -> String {
    let what = match decision.action {
        ModerationAction::Mute if decision.duration_seconds == 0 => {
            format!("🔇 {name} has been muted indefinitely.")
        }
        ModerationAction::Mute => format!(
            "🔇 {name} has been muted for {}.",
            describe_duration(decision.duration_seconds)
        ),
        ModerationAction::Ban => format!("🚫 {name} has been banned."),
        ModerationAction::Delete => format!("🗑 Messages from {name} have been deleted."),
        ModerationAction::None => format!("{name}: no action taken."),
    };
    format!("{what}\nReason: {}", decision.reason)
}

fn describe_duration(secs: u64) -> String {
    let (n, unit) = if secs % 86_400 == 0 {
        (secs / 86_400, "day")
    } else if secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}
