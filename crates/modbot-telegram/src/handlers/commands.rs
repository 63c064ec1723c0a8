use std::sync::Arc;

use teloxide::{prelude::*, types::User};

use modbot_core::{
    domain::{ChatId, UserId},
    ports::ModerationPlatform,
};

use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

const KNOWN_COMMANDS: &[&str] = &[
    "help",
    "start",
    "automod",
    "reloadpatterns",
    "trust",
    "untrust",
    "trusted",
];

pub(crate) fn is_known_command(text: &str) -> bool {
    text.starts_with('/') && KNOWN_COMMANDS.contains(&parse_command(text).0.as_str())
}

/// Where an inbound group message goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Route {
    /// Known command from the owner or a chat admin.
    Command,
    /// Known command from anyone else: refused, then moderated.
    Denied,
    Moderate,
}

pub(crate) fn route(text: Option<&str>, privileged: bool) -> Route {
    match text {
        Some(t) if is_known_command(t) && privileged => Route::Command,
        Some(t) if is_known_command(t) => Route::Denied,
        _ => Route::Moderate,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AutomodArg {
    On,
    Off,
    Status,
}

fn parse_automod_arg(arg: &str) -> Option<AutomodArg> {
    match arg.trim().to_lowercase().as_str() {
        "on" | "enable" | "true" => Some(AutomodArg::On),
        "off" | "disable" | "false" => Some(AutomodArg::Off),
        "" | "status" => Some(AutomodArg::Status),
        _ => None,
    }
}

const HELP: &str = "🛡️ Moderation bot\n\n\
Messages with links, ads or banned phrases are reviewed automatically.\n\n\
Admin commands:\n\
/automod on|off|status - Toggle automatic moderation for this chat\n\
/reloadpatterns - Reload the banned pattern list\n\
/trust, /untrust - Reply to a member to add or remove them as trusted\n\
/trusted - List trusted members, or check the replied-to member\n\
/help - Show this message";

async fn send(state: &AppState, chat_id: ChatId, text: &str) {
    if let Err(e) = state.platform.send_message(chat_id, text).await {
        tracing::warn!(chat_id = chat_id.0, "failed to send command reply: {e}");
    }
}

/// Bot owner, or an admin of the chat per the exemption cache.
pub(crate) async fn is_privileged(state: &AppState, chat_id: ChatId, user_id: UserId) -> bool {
    if state.cfg.bot_owner_id == Some(user_id.0) {
        return true;
    }
    state
        .admins
        .resolve(state.platform.as_ref(), chat_id, user_id)
        .await
}

pub(crate) async fn deny(state: &AppState, msg: &Message) {
    let chat_id = ChatId(msg.chat.id.0);
    let cmd = msg.text().map(|t| parse_command(t).0).unwrap_or_default();
    tracing::info!(
        chat_id = chat_id.0,
        user_id = ?msg.from().map(|u| u.id.0),
        cmd = %cmd,
        "command denied"
    );
    send(state, chat_id, "⛔ Only chat administrators can use this command.").await;
}

fn display_name(user: &User) -> String {
    match &user.username {
        Some(username) => format!("@{username}"),
        None => user.full_name(),
    }
}

/// Caller must have checked the sender is privileged.
pub async fn handle_command(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let chat_id = ChatId(msg.chat.id.0);
    let (cmd, arg) = parse_command(text);
    let target = msg.reply_to_message().and_then(|r| r.from());

    match cmd.as_str() {
        "help" | "start" => {
            send(&state, chat_id, HELP).await;
        }

        "automod" => {
            let Some(action) = parse_automod_arg(&arg) else {
                send(
                    &state,
                    chat_id,
                    "Invalid argument. Use /automod on to enable or /automod off to disable automatic moderation.",
                )
                .await;
                return Ok(());
            };

            let enabled = state.settings.automod_enabled(chat_id);
            let reply = match action {
                AutomodArg::Status if enabled => "Automatic moderation is enabled.".to_string(),
                AutomodArg::Status => "Automatic moderation is disabled.".to_string(),
                AutomodArg::On if enabled => "Automatic moderation is already enabled.".to_string(),
                AutomodArg::Off if !enabled => {
                    "Automatic moderation is already disabled.".to_string()
                }
                AutomodArg::On | AutomodArg::Off => {
                    let enable = action == AutomodArg::On;
                    match state.settings.set_automod(chat_id, enable) {
                        Ok(()) if enable => "Automatic moderation has been enabled.".to_string(),
                        Ok(()) => "Automatic moderation has been disabled.".to_string(),
                        Err(e) => {
                            tracing::error!(chat_id = chat_id.0, "failed to save chat settings: {e}");
                            format!("Something went wrong: {e}")
                        }
                    }
                }
            };
            send(&state, chat_id, &reply).await;
        }

        "reloadpatterns" => {
            let status = match state
                .platform
                .send_message(chat_id, "🔄 Reloading banned patterns...")
                .await
            {
                Ok(r) => Some(r),
                Err(e) => {
                    tracing::warn!(chat_id = chat_id.0, "failed to send status message: {e}");
                    None
                }
            };

            let reply = match state.patterns.reload().await {
                Ok(n) => format!("✅ Loaded {n} banned patterns."),
                Err(e) => {
                    tracing::error!("pattern reload failed: {e}");
                    format!("❌ Failed to reload patterns: {e}")
                }
            };

            match status {
                Some(r) => {
                    if let Err(e) = state.platform.edit_message(r, &reply).await {
                        tracing::warn!(chat_id = chat_id.0, "failed to edit status message: {e}");
                    }
                }
                None => send(&state, chat_id, &reply).await,
            }
        }

        "trust" => {
            let Some(target) = target else {
                send(
                    &state,
                    chat_id,
                    "Please reply to a message from the user you want to trust.",
                )
                .await;
                return Ok(());
            };
            let name = display_name(target);
            let reply = match state.settings.trust(chat_id, UserId(target.id.0 as i64)) {
                Ok(true) => format!("{name} has been added to trusted users."),
                Ok(false) => format!("{name} is already a trusted user."),
                Err(e) => {
                    tracing::error!(chat_id = chat_id.0, "failed to save trusted users: {e}");
                    format!("Something went wrong: {e}")
                }
            };
            send(&state, chat_id, &reply).await;
        }

        "untrust" => {
            let Some(target) = target else {
                send(
                    &state,
                    chat_id,
                    "Please reply to a message from the user you want to remove from trusted users.",
                )
                .await;
                return Ok(());
            };
            let name = display_name(target);
            let reply = match state.settings.untrust(chat_id, UserId(target.id.0 as i64)) {
                Ok(true) => format!("{name} has been removed from trusted users."),
                Ok(false) => format!("{name} is not a trusted user."),
                Err(e) => {
                    tracing::error!(chat_id = chat_id.0, "failed to save trusted users: {e}");
                    format!("Something went wrong: {e}")
                }
            };
            send(&state, chat_id, &reply).await;
        }

        "trusted" => {
            let reply = match target {
                Some(target) => {
                    let name = display_name(target);
                    if state
                        .settings
                        .is_trusted(chat_id, UserId(target.id.0 as i64))
                    {
                        format!("{name} is a trusted user.")
                    } else {
                        format!("{name} is not a trusted user.")
                    }
                }
                None => trusted_list(&state.settings.trusted(chat_id)),
            };
            send(&state, chat_id, &reply).await;
        }

        _ => {}
    }

    Ok(())
}

fn trusted_list(users: &[UserId]) -> String {
    if users.is_empty() {
        return "There are no trusted users in this chat.".to_string();
    }
    let mut out = String::from("Trusted users:");
    for user in users {
        out.push_str(&format!("\n- {}", user.0));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_commands_are_moderated() {
        assert_eq!(
            route(Some("/x Подпишись на канал t.me/spam"), true),
            Route::Moderate
        );
        assert_eq!(route(Some("/x t.me/spam"), false), Route::Moderate);
        assert_eq!(route(Some("привет"), true), Route::Moderate);
        assert_eq!(route(None, true), Route::Moderate);
    }

    #[test]
    fn known_commands_need_privilege() {
        assert_eq!(route(Some("/automod off"), true), Route::Command);
        assert_eq!(route(Some("/trust@modbot"), true), Route::Command);
        assert_eq!(route(Some("/automod off t.me/spam"), false), Route::Denied);
        assert_eq!(route(Some("/reloadpatterns"), false), Route::Denied);
    }

    #[test]
    fn command_names_must_lead_the_message() {
        assert!(!is_known_command("please /automod off"));
        assert!(!is_known_command("/automoderation"));
        assert!(is_known_command("/TRUSTED"));
    }

    #[test]
    fn trusted_list_renders_ids() {
        assert_eq!(trusted_list(&[]), "There are no trusted users in this chat.");
        assert_eq!(
            trusted_list(&[UserId(3), UserId(9)]),
            "Trusted users:\n- 3\n- 9"
        );
    }

    #[test]
    fn parses_command_with_bot_suffix() {
        assert_eq!(
            parse_command("/AutoMod@modbot off"),
            ("automod".to_string(), "off".to_string())
        );
        assert_eq!(
            parse_command("/reloadpatterns"),
            ("reloadpatterns".to_string(), String::new())
        );
    }

    #[test]
    fn automod_arguments() {
        assert_eq!(parse_automod_arg("ON"), Some(AutomodArg::On));
        assert_eq!(parse_automod_arg("disable"), Some(AutomodArg::Off));
        assert_eq!(parse_automod_arg(""), Some(AutomodArg::Status));
        assert_eq!(parse_automod_arg("maybe"), None);
    }
}
