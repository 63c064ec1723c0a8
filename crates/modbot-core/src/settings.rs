use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChatId, UserId},
    Result,
};

/// Per-chat moderation switches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_automod")]
    pub automod: bool,
    /// Members exempt from enforcement in this chat.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub trusted: BTreeSet<i64>,
}

fn default_automod() -> bool {
    true
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            automod: default_automod(),
            trusted: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFileData {
    #[serde(default)]
    chats: BTreeMap<i64, ChatSettings>,
}

/// JSON-backed chat settings. Chats without an entry use the defaults
/// (automod enabled, nobody trusted).
#[derive(Debug)]
pub struct ChatSettingsStore {
    path: Option<PathBuf>,
    chats: RwLock<BTreeMap<i64, ChatSettings>>,
}

impl ChatSettingsStore {
    /// In-memory only; nothing is persisted.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            chats: RwLock::new(BTreeMap::new()),
        }
    }

    /// Load from `path`. A missing or empty file starts with defaults.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = load_settings_file(&path)?.unwrap_or_default();
        Ok(Self {
            path: Some(path),
            chats: RwLock::new(data.chats),
        })
    }

    pub fn automod_enabled(&self, chat_id: ChatId) -> bool {
        self.chats
            .read()
            .get(&chat_id.0)
            .map_or_else(default_automod, |s| s.automod)
    }

    pub fn set_automod(&self, chat_id: ChatId, enabled: bool) -> Result<()> {
        self.update(chat_id, |s| s.automod = enabled)?;
        tracing::info!(chat_id = chat_id.0, enabled, "automod toggled");
        Ok(())
    }

    pub fn is_trusted(&self, chat_id: ChatId, user_id: UserId) -> bool {
        self.chats
            .read()
            .get(&chat_id.0)
            .is_some_and(|s| s.trusted.contains(&user_id.0))
    }

    /// Trusted members of a chat, in ascending id order.
    pub fn trusted(&self, chat_id: ChatId) -> Vec<UserId> {
        self.chats
            .read()
            .get(&chat_id.0)
            .map(|s| s.trusted.iter().copied().map(UserId).collect())
            .unwrap_or_default()
    }

    /// `false` if the user was already trusted.
    pub fn trust(&self, chat_id: ChatId, user_id: UserId) -> Result<bool> {
        let added = self.update(chat_id, |s| s.trusted.insert(user_id.0))?;
        if added {
            tracing::info!(chat_id = chat_id.0, user_id = user_id.0, "user trusted");
        }
        Ok(added)
    }

    /// `false` if the user was not trusted.
    pub fn untrust(&self, chat_id: ChatId, user_id: UserId) -> Result<bool> {
        let removed = self.update(chat_id, |s| s.trusted.remove(&user_id.0))?;
        if removed {
            tracing::info!(chat_id = chat_id.0, user_id = user_id.0, "user no longer trusted");
        }
        Ok(removed)
    }

    fn update<T>(&self, chat_id: ChatId, f: impl FnOnce(&mut ChatSettings) -> T) -> Result<T> {
        let (out, snapshot) = {
            let mut chats = self.chats.write();
            let out = f(chats.entry(chat_id.0).or_default());
            let snapshot = SettingsFileData {
                chats: chats.clone(),
            };
            (out, snapshot)
        };

        if let Some(path) = &self.path {
            save_settings_file(path, &snapshot)?;
        }
        Ok(out)
    }
}

fn load_settings_file(path: &Path) -> Result<Option<SettingsFileData>> {
    if !path.exists() {
        return Ok(None);
    }
    let txt = std::fs::read_to_string(path)?;
    if txt.trim().is_empty() {
        return Ok(None);
    }
    let data: SettingsFileData = serde_json::from_str(&txt)?;
    Ok(Some(data))
}

fn save_settings_file(path: &Path, data: &SettingsFileData) -> Result<()> {
    let txt = serde_json::to_string_pretty(data)?;
    std::fs::write(path, txt)?;
    Ok(())
}
