//! Cheap local signal detectors run before any classifier call.

pub mod behavior;
pub mod expand;
pub mod fuzzy;
pub mod link_ad;

use crate::prompts::ModerationMode;

/// Default fuzzy threshold (0..=100) for both detectors.
pub const DEFAULT_FUZZY_THRESHOLD: u8 = 85;

/// Detector mode that caused a message to be escalated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerKind {
    Regex,
    Fuzzy,
    Link,
    None,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::Regex => "regex",
            TriggerKind::Fuzzy => "fuzzy",
            TriggerKind::Link => "link",
            TriggerKind::None => "none",
        }
    }
}

/// Ephemeral per-message detection result handed to the dispatcher.
#[derive(Clone, Debug, PartialEq)]
pub struct ModerationSignal {
    pub triggered_by: TriggerKind,
    /// Detection mode(s) as a hint for the classifier, e.g. `regex+fuzzy`.
    pub method: String,
    pub matched_text: Option<String>,
    pub reason: String,
    /// Prompt flavor best suited to this signal.
    pub mode: ModerationMode,
}

impl ModerationSignal {
    pub fn none() -> Self {
        Self {
            triggered_by: TriggerKind::None,
            method: String::new(),
            matched_text: None,
            reason: String::new(),
            mode: ModerationMode::General,
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered_by != TriggerKind::None
    }
}
