//! Banned behavior patterns: store adapter and the process-wide cache.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{detect::expand::expand_pattern, errors::Error, ports::PatternStore, Result};

/// One banned pattern as stored: a regex source plus its danger level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannedPattern {
    pub text: String,
    #[serde(default, alias = "danger", alias = "dangerLevel")]
    pub danger_level: i32,
}

/// Accepted on-disk shapes: a bare list, or a list of documents each holding
/// a `patterns` array (the document-database export format).
#[derive(Deserialize)]
#[serde(untagged)]
enum PatternFile {
    Flat(Vec<BannedPattern>),
    Documents(Vec<PatternDocument>),
}

#[derive(Deserialize)]
struct PatternDocument {
    #[serde(default)]
    patterns: Vec<BannedPattern>,
}

/// Pattern store backed by a JSON file.
#[derive(Clone, Debug)]
pub struct JsonPatternStore {
    path: PathBuf,
}

impl JsonPatternStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PatternStore for JsonPatternStore {
    async fn list_banned_patterns(&self) -> Result<Vec<BannedPattern>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "pattern file not found, no patterns loaded");
                return Ok(Vec::new());
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let parsed: PatternFile = serde_json::from_str(&raw)?;
        Ok(match parsed {
            PatternFile::Flat(v) => v,
            PatternFile::Documents(docs) => docs.into_iter().flat_map(|d| d.patterns).collect(),
        })
    }
}

/// A pattern prepared for matching: compiled regex and literal variants.
#[derive(Clone, Debug)]
pub struct CompiledPattern {
    pub pattern: BannedPattern,
    /// `None` when the source is not a valid regex (exact step skipped).
    pub regex: Option<Regex>,
    /// Lowercased literal variants used for fuzzy scoring.
    pub variants: Vec<String>,
}

impl CompiledPattern {
    pub fn compile(pattern: BannedPattern) -> Self {
        let regex = match RegexBuilder::new(&pattern.text)
            .case_insensitive(true)
            .build()
        {
            Ok(r) => Some(r),
            Err(e) => {
                let err = Error::Detection(format!("invalid pattern {:?}: {e}", pattern.text));
                tracing::warn!("{err}");
                None
            }
        };
        let variants = expand_pattern(&pattern.text)
            .into_iter()
            .map(|v| v.to_lowercase())
            .filter(|v| !v.trim().is_empty())
            .collect();
        Self {
            pattern,
            regex,
            variants,
        }
    }
}

/// Populate-once, read-many cache over a `PatternStore`.
///
/// The populate step runs under the lock, so concurrent first callers wait for
/// a single fetch instead of issuing their own.
pub struct PatternCache {
    store: Arc<dyn PatternStore>,
    cached: Mutex<Option<Arc<Vec<CompiledPattern>>>>,
}

impl PatternCache {
    pub fn new(store: Arc<dyn PatternStore>) -> Self {
        Self {
            store,
            cached: Mutex::new(None),
        }
    }

    pub async fn get(&self) -> Result<Arc<Vec<CompiledPattern>>> {
        let mut guard = self.cached.lock().await;
        if let Some(p) = guard.as_ref() {
            return Ok(p.clone());
        }

        let fetched = self.store.list_banned_patterns().await?;
        tracing::debug!(count = fetched.len(), "banned patterns loaded");
        let compiled = Arc::new(
            fetched
                .into_iter()
                .map(CompiledPattern::compile)
                .collect::<Vec<_>>(),
        );
        *guard = Some(compiled.clone());
        Ok(compiled)
    }

    /// Drop the cached list and fetch it again. Returns the new pattern count.
    pub async fn reload(&self) -> Result<usize> {
        {
            let mut guard = self.cached.lock().await;
            *guard = None;
        }
        Ok(self.get().await?.len())
    }
}
