use regex::{Regex, RegexBuilder};

use crate::{
    detect::{fuzzy::containment_score, ModerationSignal, TriggerKind, DEFAULT_FUZZY_THRESHOLD},
    domain::MessageEntity,
    prompts::ModerationMode,
};

/// Promotional phrases checked by the ad detector.
pub const AD_KEYWORDS: &[&str] = &[
    "подпишись",
    "вступай",
    "переходи",
    "ссылка в описании",
    "зарегистрируйся",
    "узнай больше",
    "получи деньги",
    "заработай",
    "прибыль",
    "скидка",
    "акция",
    "промокод",
    "бот",
    "нажми",
    "получи бонус",
];

const URL_PATTERN: &str = r"(https?://\S+|t\.me/\S+|@\w+|www\.\S+)";

#[derive(Clone, Debug, PartialEq)]
pub struct LinkAdVerdict {
    pub triggered: bool,
    /// `regex`, `fuzzy`, `regex+fuzzy`, `link` or empty.
    pub method: String,
    pub reason: String,
    pub has_link: bool,
    pub matched_keywords: Vec<String>,
    pub fuzzy_hits: Vec<(String, u8)>,
}

impl LinkAdVerdict {
    /// Convert into a dispatcher signal.
    pub fn into_signal(self) -> ModerationSignal {
        if !self.triggered {
            return ModerationSignal::none();
        }
        let triggered_by = if !self.matched_keywords.is_empty() {
            TriggerKind::Regex
        } else if !self.fuzzy_hits.is_empty() {
            TriggerKind::Fuzzy
        } else {
            TriggerKind::Link
        };
        let matched_text = self
            .matched_keywords
            .first()
            .cloned()
            .or_else(|| self.fuzzy_hits.first().map(|(kw, _)| kw.clone()));
        ModerationSignal {
            triggered_by,
            method: self.method,
            matched_text,
            reason: self.reason,
            mode: ModerationMode::Ads,
        }
    }
}

/// Keyword + fuzzy + URL/entity ad detector. Stateless between calls.
#[derive(Clone, Debug)]
pub struct LinkAdDetector {
    threshold: u8,
    keywords: Vec<(String, Regex)>,
    url: Option<Regex>,
}

impl Default for LinkAdDetector {
    fn default() -> Self {
        Self::new(DEFAULT_FUZZY_THRESHOLD)
    }
}

impl LinkAdDetector {
    pub fn new(threshold: u8) -> Self {
        let keywords = AD_KEYWORDS
            .iter()
            .filter_map(|kw| {
                match RegexBuilder::new(&regex::escape(kw))
                    .case_insensitive(true)
                    .build()
                {
                    Ok(re) => Some((kw.to_string(), re)),
                    Err(e) => {
                        tracing::error!(keyword = kw, "keyword regex failed to build: {e}");
                        None
                    }
                }
            })
            .collect();

        let url = match RegexBuilder::new(URL_PATTERN).case_insensitive(true).build() {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!("url regex failed to build: {e}");
                None
            }
        };

        Self {
            threshold: threshold.min(100),
            keywords,
            url,
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn detect(&self, text: &str, entities: &[MessageEntity]) -> LinkAdVerdict {
        tracing::debug!("detecting ads");
        let lower = text.to_lowercase();

        let mut matched_keywords = Vec::new();
        let mut fuzzy_hits = Vec::new();
        for (kw, re) in &self.keywords {
            if re.is_match(text) {
                matched_keywords.push(kw.clone());
            }
            let score = containment_score(&kw.to_lowercase(), &lower);
            if score >= self.threshold {
                fuzzy_hits.push((kw.clone(), score));
            }
        }

        let url_found = self.url.as_ref().is_some_and(|re| re.is_match(text));
        let text_link = entities
            .iter()
            .any(|e| matches!(e, MessageEntity::TextLink { .. }));
        let has_link = url_found || text_link;

        let triggered = has_link || !matched_keywords.is_empty() || !fuzzy_hits.is_empty();
        if !triggered {
            return LinkAdVerdict {
                triggered: false,
                method: String::new(),
                reason: String::new(),
                has_link: false,
                matched_keywords,
                fuzzy_hits,
            };
        }

        let mut reason = String::new();
        if has_link {
            reason.push_str("Contains a link. ");
        }
        if !matched_keywords.is_empty() {
            reason.push_str(&format!("Keywords: {}. ", matched_keywords.join(", ")));
        }
        if !fuzzy_hits.is_empty() {
            let hits = fuzzy_hits
                .iter()
                .map(|(kw, score)| format!("{kw} ({score})"))
                .collect::<Vec<_>>()
                .join(", ");
            reason.push_str(&format!("Similar expressions: {hits}."));
        }

        let method = match (!matched_keywords.is_empty(), !fuzzy_hits.is_empty()) {
            (true, true) => "regex+fuzzy",
            (true, false) => "regex",
            (false, true) => "fuzzy",
            (false, false) => "link",
        };

        LinkAdVerdict {
            triggered,
            method: method.to_string(),
            reason: reason.trim_end().to_string(),
            has_link,
            matched_keywords,
            fuzzy_hits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_with_link_triggers() {
        let d = LinkAdDetector::default();
        let v = d.detect("Подпишись на канал t.me/spam", &[]);
        assert!(v.triggered);
        assert!(v.method.contains("regex") || v.method.contains("fuzzy"));
        assert!(v.has_link);
        assert!(v.reason.contains("link"));
        assert!(v.reason.contains("подпишись"));
    }

    #[test]
    fn plain_chat_does_not_trigger() {
        let d = LinkAdDetector::default();
        let v = d.detect("Привет, как дела?", &[]);
        assert!(!v.triggered);
        assert!(v.reason.is_empty());
        assert_eq!(v.into_signal().triggered_by, TriggerKind::None);
    }

    #[test]
    fn text_link_entity_alone_triggers_as_link() {
        let d = LinkAdDetector::default();
        let v = d.detect(
            "смотрите тут",
            &[MessageEntity::TextLink {
                url: "https://example.com".to_string(),
            }],
        );
        assert!(v.triggered);
        assert_eq!(v.method, "link");
        let sig = v.into_signal();
        assert_eq!(sig.triggered_by, TriggerKind::Link);
        assert_eq!(sig.mode, ModerationMode::Ads);
    }

    #[test]
    fn misspelled_keyword_is_a_fuzzy_hit() {
        let d = LinkAdDetector::default();
        let v = d.detect("зарегестрируйся сегодня", &[]);
        assert!(v.triggered);
        assert_eq!(v.method, "fuzzy");
        assert!(v.fuzzy_hits.iter().any(|(kw, _)| kw == "зарегистрируйся"));
    }

    #[test]
    fn detector_holds_no_state_between_calls() {
        let d = LinkAdDetector::default();
        assert!(d.detect("скидка", &[]).triggered);
        let v = d.detect("обычный текст", &[]);
        assert!(!v.triggered);
        assert!(v.matched_keywords.is_empty());
    }
}
