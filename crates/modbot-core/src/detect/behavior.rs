use std::sync::Arc;

use crate::{
    detect::{fuzzy::best_window_score, ModerationSignal, TriggerKind, DEFAULT_FUZZY_THRESHOLD},
    patterns::{CompiledPattern, PatternCache},
    prompts::ModerationMode,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BehaviorVerdict {
    pub triggered: bool,
    /// `regex`, `fuzzy` or empty.
    pub method: String,
    pub matched_text: Option<String>,
    pub pattern: Option<String>,
    pub danger_level: i32,
    pub score: u8,
}

impl BehaviorVerdict {
    fn miss() -> Self {
        Self {
            triggered: false,
            method: String::new(),
            matched_text: None,
            pattern: None,
            danger_level: 0,
            score: 0,
        }
    }

    pub fn into_signal(self) -> ModerationSignal {
        if !self.triggered {
            return ModerationSignal::none();
        }
        let triggered_by = if self.method == "regex" {
            TriggerKind::Regex
        } else {
            TriggerKind::Fuzzy
        };
        let reason = format!(
            "Matched banned pattern {:?} (danger {}) via {}",
            self.pattern.as_deref().unwrap_or(""),
            self.danger_level,
            self.method
        );
        ModerationSignal {
            triggered_by,
            method: self.method,
            matched_text: self.matched_text,
            reason,
            mode: ModerationMode::Toxicity,
        }
    }
}

/// Banned-behavior matcher: exact regex first, then fuzzy over expanded
/// pattern variants.
pub struct BehaviorMatcher {
    patterns: Arc<PatternCache>,
    threshold: u8,
}

impl BehaviorMatcher {
    pub fn new(patterns: Arc<PatternCache>) -> Self {
        Self::with_threshold(patterns, DEFAULT_FUZZY_THRESHOLD)
    }

    pub fn with_threshold(patterns: Arc<PatternCache>, threshold: u8) -> Self {
        Self {
            patterns,
            threshold: threshold.min(100),
        }
    }

    pub async fn check(&self, text: &str) -> BehaviorVerdict {
        if text.trim().is_empty() {
            return BehaviorVerdict::miss();
        }

        let patterns = match self.patterns.get().await {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("banned patterns unavailable, skipping behavior check: {e}");
                return BehaviorVerdict::miss();
            }
        };
        if patterns.is_empty() {
            tracing::debug!("no banned patterns configured");
            return BehaviorVerdict::miss();
        }

        for p in patterns.iter() {
            let Some(re) = &p.regex else {
                continue;
            };
            if let Some(m) = re.find(text) {
                tracing::info!(
                    pattern = %p.pattern.text,
                    matched = m.as_str(),
                    "exact banned pattern match"
                );
                return BehaviorVerdict {
                    triggered: true,
                    method: "regex".to_string(),
                    matched_text: Some(m.as_str().to_string()),
                    pattern: Some(p.pattern.text.clone()),
                    danger_level: p.pattern.danger_level,
                    score: 100,
                };
            }
        }

        // Scoring is CPU-bound; keep it off the async workers.
        let lower: Vec<char> = text.to_lowercase().chars().collect();
        let threshold = self.threshold;
        let scanned = Arc::clone(&patterns);
        let best = match tokio::task::spawn_blocking(move || {
            best_fuzzy_match(&scanned, &lower, threshold)
        })
        .await
        {
            Ok(best) => best,
            Err(e) => {
                tracing::error!("fuzzy scan task failed: {e}");
                return BehaviorVerdict::miss();
            }
        };

        let Some((score, pi, vi)) = best else {
            tracing::debug!("no offensive behavior detected");
            return BehaviorVerdict::miss();
        };
        let p = &patterns[pi];
        let variant = p.variants[vi].as_str();

        tracing::info!(
            pattern = %p.pattern.text,
            variant,
            score,
            "fuzzy banned pattern match"
        );
        BehaviorVerdict {
            triggered: true,
            method: "fuzzy".to_string(),
            matched_text: Some(variant.to_string()),
            pattern: Some(p.pattern.text.clone()),
            danger_level: p.pattern.danger_level,
            score,
        }
    }
}

/// Highest-scoring variant at or above `threshold`, as
/// `(score, pattern index, variant index)`. First-declared pattern, then
/// first-generated variant, wins ties.
fn best_fuzzy_match(
    patterns: &[CompiledPattern],
    text: &[char],
    threshold: u8,
) -> Option<(u8, usize, usize)> {
    let mut best: Option<(u8, usize, usize)> = None;
    for (pi, p) in patterns.iter().enumerate() {
        for (vi, variant) in p.variants.iter().enumerate() {
            let min_score = match best {
                Some((100, ..)) => return best,
                Some((s, ..)) => s + 1,
                None => threshold,
            };
            let needle: Vec<char> = variant.chars().collect();
            let score = best_window_score(&needle, text, min_score);
            if score >= min_score {
                best = Some((score, pi, vi));
            }
        }
    }
    best
}
