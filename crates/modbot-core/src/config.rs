use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, prompts::ModerationMode, Result};

/// Typed runtime configuration, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub moderated_chats: Vec<i64>,
    pub bot_owner_id: Option<i64>,

    // Classifier
    pub classifier_api_key: String,
    pub classifier_base_url: String,
    pub classifier_model: String,
    pub classifier_temperature: f32,
    pub classifier_max_tokens: u32,
    pub classifier_timeout: Duration,

    // Moderation
    pub moderation_mode: ModerationMode,
    pub chat_rules: Option<String>,
    pub patterns_file: PathBuf,
    pub fuzzy_threshold: u8,
    pub ad_fuzzy_threshold: u8,
    pub confidence_threshold: f64,
    pub context_window: usize,

    // Admin cache
    pub admin_cache_ttl: Duration,
    pub admin_cache_cleanup_interval: Duration,

    // Adapter buffers / persistence
    pub history_buffer_size: usize,
    pub chat_settings_file: PathBuf,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        let classifier_api_key = env_str("CLASSIFIER_API_KEY").unwrap_or_default();
        if classifier_api_key.trim().is_empty() {
            return Err(Error::Config(
                "CLASSIFIER_API_KEY environment variable is required".to_string(),
            ));
        }

        let moderated_chats = parse_csv_i64(env_str("MODERATED_CHATS"));
        let bot_owner_id = env_str("BOT_OWNER_ID").and_then(|s| s.trim().parse::<i64>().ok());

        // Classifier endpoint
        let classifier_base_url = env_str("CLASSIFIER_BASE_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| "https://api.intelligence.io.solutions/api/v1".to_string());
        let classifier_model = env_str("CLASSIFIER_MODEL")
            .and_then(non_empty)
            .unwrap_or_else(|| "meta-llama/Llama-3.3-70B-Instruct".to_string());
        let classifier_temperature = env_f64("CLASSIFIER_TEMPERATURE").unwrap_or(0.7) as f32;
        let classifier_max_tokens = env_u32("CLASSIFIER_MAX_TOKENS").unwrap_or(200);
        let classifier_timeout =
            Duration::from_millis(env_u64("CLASSIFIER_TIMEOUT_MS").unwrap_or(30_000));

        // Moderation behavior
        let moderation_mode = match env_str("MODERATION_MODE") {
            Some(raw) => raw.parse::<ModerationMode>()?,
            None => ModerationMode::General,
        };
        let chat_rules = env_str("CHAT_RULES").and_then(non_empty);
        let patterns_file = PathBuf::from(
            env_str("PATTERNS_FILE").unwrap_or_else(|| "banned-patterns.json".to_string()),
        );
        let fuzzy_threshold = env_u8_percent("FUZZY_THRESHOLD").unwrap_or(85);
        let ad_fuzzy_threshold = env_u8_percent("AD_FUZZY_THRESHOLD").unwrap_or(85);

        let confidence_threshold = env_f64("CONFIDENCE_THRESHOLD").unwrap_or(0.5);
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(Error::Config(format!(
                "CONFIDENCE_THRESHOLD must be within [0, 1], got {confidence_threshold}"
            )));
        }
        let context_window = env_usize("CONTEXT_WINDOW").unwrap_or(10).max(1);

        let admin_cache_ttl = Duration::from_secs(env_u64("ADMIN_CACHE_TTL").unwrap_or(60));
        let admin_cache_cleanup_interval =
            Duration::from_secs(env_u64("ADMIN_CACHE_CLEANUP_INTERVAL").unwrap_or(300).max(1));

        let history_buffer_size = env_usize("HISTORY_BUFFER_SIZE")
            .unwrap_or(200)
            .max(context_window);
        let chat_settings_file = PathBuf::from(
            env_str("CHAT_SETTINGS_FILE")
                .unwrap_or_else(|| "/tmp/modbot-chat-settings.json".to_string()),
        );

        // Audit logging
        let audit_log_path = PathBuf::from(
            env_str("AUDIT_LOG_PATH").unwrap_or_else(|| "/tmp/modbot-audit.log".to_string()),
        );
        let audit_log_json = env_bool("AUDIT_LOG_JSON").unwrap_or(true);

        Ok(Self {
            telegram_bot_token,
            moderated_chats,
            bot_owner_id,
            classifier_api_key,
            classifier_base_url,
            classifier_model,
            classifier_temperature,
            classifier_max_tokens,
            classifier_timeout,
            moderation_mode,
            chat_rules,
            patterns_file,
            fuzzy_threshold,
            ad_fuzzy_threshold,
            confidence_threshold,
            context_window,
            admin_cache_ttl,
            admin_cache_cleanup_interval,
            history_buffer_size,
            chat_settings_file,
            audit_log_path,
            audit_log_json,
        })
    }

    /// Empty allow-list means every group the bot is in.
    pub fn is_moderated_chat(&self, chat_id: i64) -> bool {
        self.moderated_chats.is_empty() || self.moderated_chats.contains(&chat_id)
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let Some((key, val)) = parse_dotenv_line(raw) else {
            continue;
        };
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv_line(raw: &str) -> Option<(String, String)> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (k, v) = line.split_once('=')?;
    let key = k.trim();
    if key.is_empty() {
        return None;
    }

    let mut val = v.trim().to_string();
    // Strip optional surrounding quotes.
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        val = val[1..val.len() - 1].to_string();
    }
    Some((key.to_string(), val))
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    env_str(key)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn env_u8_percent(key: &str) -> Option<u8> {
    env_str(key)
        .and_then(|s| s.trim().parse::<u8>().ok())
        .map(|v| v.min(100))
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
