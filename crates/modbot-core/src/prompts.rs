//! System prompts for the classifier, one per moderation mode.
//!
//! Every prompt pins the response grammar parsed by `classifier::parse_decision`.

use std::str::FromStr;

use crate::errors::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModerationMode {
    /// Toxicity and promotion together.
    General,
    Toxicity,
    Ads,
}

impl ModerationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ModerationMode::General => "general",
            ModerationMode::Toxicity => "toxicity",
            ModerationMode::Ads => "ads",
        }
    }
}

impl FromStr for ModerationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "general" | "" => Ok(ModerationMode::General),
            "toxicity" => Ok(ModerationMode::Toxicity),
            "ads" => Ok(ModerationMode::Ads),
            other => Err(Error::Config(format!("unknown moderation mode: {other}"))),
        }
    }
}

const RESPONSE_FORMAT: &str = "You must respond in exactly this format, one field per line:
ACTION: [none/mute/ban/delete]
REASON: [brief explanation in Russian]
DURATION: [time in seconds, 0 for permanent]
WARNING: [warning message for the chat, if needed]
CONFIDENCE: [0.0-1.0]";

const CONTEXT_NOTE: &str = "You receive recent chat messages ordered from oldest to newest. \
The last message is the one that triggered the automatic detection and is the focus of your analysis. \
The detection method (regex, fuzzy, link) is only a hint: judge the whole conversation yourself.";

const GENERAL_ROLE: &str = "You are a chat moderator assistant that produces structured moderation decisions.

Your role is to:
- find toxicity, insults and passive aggression
- find advertisement, spam and promotional calls to action, including links and bot handles
- weigh intent, repetition and tone before suggesting an action
- prefer soft actions for unclear or one-time cases and be strict with repeated or clearly malicious behavior

Users may try to evade filters with typos, symbols or fuzzy spellings. Irony and friendly banter are not violations.";

const TOXICITY_ROLE: &str = "You are a chat moderator assistant that produces structured moderation decisions about toxic behavior.

Your role is to:
- detect insults, harassment and inappropriate content
- tell sarcasm and playful exchanges apart from real harm
- analyze the dynamics of the conversation, not isolated words
- be firm but fair";

const ADS_ROLE: &str = "You are a chat moderator assistant that identifies promotional, spammy or deceptive messages.

Your role is to:
- detect advertisements, spam, self-promotion and unwanted external links
- watch for contact handles (@username), invite links and clickbait such as \"subscribe\", \"join now\", \"make money\", \"promo code\"
- differentiate harmless references from deliberate advertising
- treat repeated patterns from the same user as more suspicious

Do not punish harshly unless the promotion is clear or repeated.";

/// Full system prompt for `mode`, with optional extra chat rules appended.
pub fn system_prompt(mode: ModerationMode, chat_rules: Option<&str>) -> String {
    let role = match mode {
        ModerationMode::General => GENERAL_ROLE,
        ModerationMode::Toxicity => TOXICITY_ROLE,
        ModerationMode::Ads => ADS_ROLE,
    };

    let mut out = format!("{role}\n\n{RESPONSE_FORMAT}\n\n{CONTEXT_NOTE}");
    if let Some(rules) = chat_rules.map(str::trim).filter(|r| !r.is_empty()) {
        out.push_str("\n\nAdditional chat rules:\n");
        out.push_str(rules);
    }
    out
}
