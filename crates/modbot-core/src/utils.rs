use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::{domain::MessageIdentity, errors::Error, Result};

// ============== Timestamp Helpers ==============

/// RFC3339 timestamp in UTC (for logs/telemetry).
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

// ============== Audit Logging ==============

const AUDIT_MAX_TEXT: usize = 500;

/// One moderation audit record.
#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,

    pub chat_id: i64,
    pub user_id: i64,
    pub message_id: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<bool>,
}

impl AuditEvent {
    fn base(event: &str, id: MessageIdentity) -> Self {
        Self {
            timestamp: iso_timestamp_utc(),
            event: event.to_string(),
            chat_id: id.chat_id.0,
            user_id: id.user_id.0,
            message_id: id.message_id.0,
            method: None,
            content: None,
            action: None,
            reason: None,
            confidence: None,
            applied: None,
        }
    }

    /// A classifier decision and whether enforcement succeeded.
    pub fn enforcement(
        id: MessageIdentity,
        method: &str,
        content: &str,
        action: &str,
        reason: &str,
        confidence: f64,
        applied: bool,
    ) -> Self {
        Self {
            method: Some(method.to_string()),
            content: Some(content.to_string()),
            action: Some(action.to_string()),
            reason: Some(reason.to_string()),
            confidence: Some(confidence),
            applied: Some(applied),
            ..Self::base("enforcement", id)
        }
    }

    /// Enforcement skipped because the target is an admin / owner.
    pub fn exempt(id: MessageIdentity, action: &str, reason: &str) -> Self {
        Self {
            action: Some(action.to_string()),
            reason: Some(reason.to_string()),
            applied: Some(false),
            ..Self::base("exempt", id)
        }
    }

    /// Decision confidence too low for automatic enforcement.
    pub fn needs_review(
        id: MessageIdentity,
        content: &str,
        action: &str,
        reason: &str,
        confidence: f64,
    ) -> Self {
        Self {
            content: Some(content.to_string()),
            action: Some(action.to_string()),
            reason: Some(reason.to_string()),
            confidence: Some(confidence),
            applied: Some(false),
            ..Self::base("needs_review", id)
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, mut event: AuditEvent) -> Result<()> {
        if let Some(s) = &event.content {
            event.content = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }
        if let Some(s) = &event.reason {
            event.reason = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        // Plain text format for readability.
        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));

        let value = serde_json::to_value(&event)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::External(
                "audit event is not a JSON object".to_string(),
            ));
        };
        for (k, v) in obj {
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            out.push_str(&json_value_to_display(v));
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }

    /// Write and log on failure; audit problems never interrupt moderation.
    pub fn record(&self, event: AuditEvent) {
        let kind = event.event.clone();
        if let Err(e) = self.write(event) {
            tracing::warn!(event = %kind, "failed to write audit event: {e}");
        }
    }
}

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

fn json_value_to_display(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "<unprintable>".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, MessageId, UserId};
    use std::time::Duration;

    fn tmp_file(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}.log"))
    }

    fn identity() -> MessageIdentity {
        MessageIdentity {
            chat_id: ChatId(-1001),
            user_id: UserId(42),
            message_id: MessageId(7),
        }
    }

    #[test]
    fn truncate_text_counts_chars() {
        let s = "я".repeat(AUDIT_MAX_TEXT + 10);
        let t = truncate_text(&s, AUDIT_MAX_TEXT);
        assert!(t.ends_with("..."));
        assert_eq!(t.chars().count(), AUDIT_MAX_TEXT + 3);
    }

    #[test]
    fn audit_writes_json_lines_with_truncation() {
        let path = tmp_file("modbot-audit-test");
        let log = AuditLogger::new(path.clone(), true);
        let content = "x".repeat(AUDIT_MAX_TEXT + 1);
        log.write(AuditEvent::enforcement(
            identity(),
            "regex",
            &content,
            "mute",
            "спам",
            0.9,
            true,
        ))
        .unwrap();
        log.write(AuditEvent::exempt(identity(), "ban", "admin")).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "enforcement");
        assert_eq!(first["chat_id"], -1001);
        assert_eq!(first["applied"], true);
        assert!(first["content"].as_str().unwrap().ends_with("..."));
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert!(second.get("confidence").is_none());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn audit_text_format_is_readable() {
        let path = tmp_file("modbot-audit-text");
        let log = AuditLogger::new(path.clone(), false);
        log.write(AuditEvent::needs_review(identity(), "hi", "ban", "unsure", 0.3))
            .unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("event: needs_review"));
        assert!(written.contains("confidence: 0.3"));
        let _ = std::fs::remove_file(path);
    }
}
