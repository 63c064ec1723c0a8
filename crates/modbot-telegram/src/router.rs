use std::sync::Arc;

use teloxide::{dispatching::Dispatcher as UpdateDispatcher, dptree, prelude::*};

use modbot_core::{
    admin_cache::AdminExemptionCache,
    classifier::ClassifierClient,
    config::Config,
    detect::{behavior::BehaviorMatcher, link_ad::LinkAdDetector},
    dispatcher::Dispatcher,
    patterns::PatternCache,
    settings::ChatSettingsStore,
    utils::AuditLogger,
};

use crate::handlers;
use crate::history::RecentMessages;
use crate::TelegramPlatform;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub platform: Arc<TelegramPlatform>,
    pub history: Arc<RecentMessages>,
    pub dispatcher: Arc<Dispatcher>,
    pub patterns: Arc<PatternCache>,
    pub settings: Arc<ChatSettingsStore>,
    pub admins: AdminExemptionCache,
}

pub async fn run_polling(
    cfg: Arc<Config>,
    classifier: ClassifierClient,
    patterns: Arc<PatternCache>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "modbot started"),
        Err(e) => tracing::warn!("get_me failed: {e}"),
    }
    if cfg.moderated_chats.is_empty() {
        tracing::info!("moderating every group the bot is in");
    } else {
        tracing::info!(chats = ?cfg.moderated_chats, "moderating allow-listed chats");
    }

    match patterns.reload().await {
        Ok(n) => tracing::info!(count = n, path = %cfg.patterns_file.display(), "banned patterns loaded"),
        Err(e) => tracing::warn!("initial pattern load failed: {e}"),
    }

    let history = Arc::new(RecentMessages::new(cfg.history_buffer_size));
    let platform = Arc::new(TelegramPlatform::new(bot.clone(), history.clone()));
    let settings = Arc::new(ChatSettingsStore::open(&cfg.chat_settings_file)?);
    let admins = AdminExemptionCache::new(cfg.admin_cache_ttl, cfg.admin_cache_cleanup_interval);

    let dispatcher = Dispatcher::new(
        platform.clone(),
        BehaviorMatcher::with_threshold(patterns.clone(), cfg.fuzzy_threshold),
        classifier,
        admins.clone(),
    )
    .with_link_detector(LinkAdDetector::new(cfg.ad_fuzzy_threshold))
    .with_context_window(cfg.context_window)
    .with_confidence_threshold(cfg.confidence_threshold)
    .with_default_mode(cfg.moderation_mode)
    .with_settings(settings.clone())
    .with_audit(AuditLogger::new(
        cfg.audit_log_path.clone(),
        cfg.audit_log_json,
    ));

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        platform,
        history,
        dispatcher: Arc::new(dispatcher),
        patterns,
        settings,
        admins,
    });

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_edited_message().endpoint(handlers::handle_edited_message));

    UpdateDispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
