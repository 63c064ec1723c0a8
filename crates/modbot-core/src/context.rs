use crate::domain::{ChatMessage, Sender};

/// Default number of messages per conversation window.
pub const DEFAULT_CONTEXT_WINDOW: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextEntry {
    pub sender_name: String,
    pub text: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub reply_to_text: Option<String>,
}

/// Ordered (oldest -> newest) conversation window around a triggering message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationContext {
    entries: Vec<ContextEntry>,
    triggered_by_sender_name: String,
}

impl ConversationContext {
    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn triggered_by_sender_name(&self) -> &str {
        &self.triggered_by_sender_name
    }

    /// Canonical transcript sent to the classifier.
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for e in &self.entries {
            out.push_str(&format!("[{}] {}: {}", e.timestamp, e.sender_name, e.text));
            if let Some(reply) = &e.reply_to_text {
                out.push_str(&format!(" (reply to: \"{reply}\")"));
            }
            out.push('\n');
        }
        out.push_str(&format!(
            "Review triggered by: {}",
            self.triggered_by_sender_name
        ));
        out
    }
}

/// Builds conversation windows. Holds no state besides the window size.
#[derive(Clone, Copy, Debug)]
pub struct ContextBuilder {
    window: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_WINDOW)
    }
}

impl ContextBuilder {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// `recent` must be ordered oldest -> newest; only the newest `window`
    /// messages are kept.
    pub fn build(&self, recent: &[ChatMessage], trigger: Option<&Sender>) -> ConversationContext {
        let skip = recent.len().saturating_sub(self.window);
        let entries = recent
            .iter()
            .skip(skip)
            .map(|m| ContextEntry {
                sender_name: sender_name(m.sender.as_ref()),
                text: m.text_or_empty().to_string(),
                timestamp: m.date.to_rfc3339(),
                reply_to_text: m.reply_to_text.clone(),
            })
            .collect();

        ConversationContext {
            entries,
            triggered_by_sender_name: sender_name(trigger),
        }
    }
}

fn sender_name(sender: Option<&Sender>) -> String {
    sender.map(Sender::name).unwrap_or_else(|| "Unknown".to_string())
}
