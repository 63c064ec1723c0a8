//! Telegram update handlers.
//!
//! Inbound group messages are converted into core `ChatMessage`s, recorded
//! in the recent-message buffer and handed to the dispatcher. Known admin
//! commands from privileged senders go to the command handler instead;
//! every other message, slash-prefixed or not, is moderated.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{Message, MessageEntityKind, User},
};

use modbot_core::{
    dispatcher::DispatchOutcome,
    domain::{ChatId, ChatMessage, MessageEntity, MessageId, Sender, UserId},
};
use tokio::task::JoinHandle;

use crate::router::AppState;

use self::commands::Route;

mod commands;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if !(msg.chat.is_group() || msg.chat.is_supergroup()) {
        return Ok(());
    }
    if !state.cfg.is_moderated_chat(msg.chat.id.0) {
        tracing::debug!(chat_id = msg.chat.id.0, "chat not in moderation allow-list");
        return Ok(());
    }

    let known = msg.text().is_some_and(commands::is_known_command);
    let privileged = match msg.from() {
        Some(user) if known => {
            commands::is_privileged(&state, ChatId(msg.chat.id.0), UserId(user.id.0 as i64)).await
        }
        _ => false,
    };

    match commands::route(msg.text(), privileged) {
        Route::Command => return commands::handle_command(bot, msg, state).await,
        Route::Denied => commands::deny(&state, &msg).await,
        Route::Moderate => {}
    }

    moderate(&state, chat_message_from(&msg));
    Ok(())
}

/// Edits replace the buffered copy and are re-checked under the same identity.
pub async fn handle_edited_message(
    _bot: Bot,
    msg: Message,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    if !(msg.chat.is_group() || msg.chat.is_supergroup())
        || !state.cfg.is_moderated_chat(msg.chat.id.0)
    {
        return Ok(());
    }
    moderate(&state, chat_message_from(&msg));
    Ok(())
}

/// Record the message and hand it to the dispatcher.
fn moderate(state: &AppState, chat_msg: ChatMessage) {
    state.history.record(chat_msg.clone());
    let chat_id = chat_msg.chat_id.0;
    let message_id = chat_msg.message_id.0;
    watch(state.dispatcher.on_candidate_message(chat_msg), chat_id, message_id);
}

/// Awaits a dispatch on its own task so a panic is logged instead of lost.
fn watch(task: JoinHandle<DispatchOutcome>, chat_id: i64, message_id: i32) -> JoinHandle<()> {
    tokio::spawn(async move {
        match task.await {
            Ok(outcome) => tracing::debug!(chat_id, message_id, ?outcome, "dispatch finished"),
            Err(e) => tracing::error!(chat_id, message_id, "dispatch task failed: {e}"),
        }
    })
}

pub fn chat_message_from(msg: &Message) -> ChatMessage {
    let text = msg.text().or_else(|| msg.caption()).map(str::to_string);
    let entities = msg
        .entities()
        .or_else(|| msg.caption_entities())
        .unwrap_or_default()
        .iter()
        .map(|e| match &e.kind {
            MessageEntityKind::TextLink { url } => MessageEntity::TextLink {
                url: url.to_string(),
            },
            MessageEntityKind::Url => MessageEntity::Url,
            MessageEntityKind::Mention => MessageEntity::Mention,
            _ => MessageEntity::Other,
        })
        .collect();
    let reply_to_text = msg
        .reply_to_message()
        .and_then(|r| r.text().or_else(|| r.caption()))
        .map(str::to_string);

    ChatMessage {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
        sender: msg.from().map(sender_from),
        text,
        entities,
        date: msg.date,
        reply_to_text,
    }
}

fn sender_from(user: &User) -> Sender {
    Sender {
        user_id: UserId(user.id.0 as i64),
        display_name: Some(user.full_name()).filter(|n| !n.trim().is_empty()),
        username: user.username.clone(),
        is_bot: user.is_bot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn panicking_dispatch_is_joined_by_the_watcher() {
        let task: JoinHandle<DispatchOutcome> =
            tokio::spawn(async { panic!("classifier reply broke the parser") });
        watch(task, -100, 5).await.unwrap();
    }

    #[tokio::test]
    async fn finished_dispatch_is_joined_by_the_watcher() {
        let task = tokio::spawn(async { DispatchOutcome::Enforced });
        watch(task, -100, 6).await.unwrap();
    }
}
