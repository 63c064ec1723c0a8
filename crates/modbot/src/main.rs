use std::sync::Arc;

use modbot_core::{
    classifier::ClassifierClient,
    config::Config,
    patterns::{JsonPatternStore, PatternCache},
};
use modbot_openai::{ClassifierSettings, OpenAiClassifier};

#[tokio::main]
async fn main() -> Result<(), modbot_core::Error> {
    modbot_core::logging::init("modbot")?;

    let cfg = Arc::new(Config::load()?);

    let port = Arc::new(OpenAiClassifier::new(
        cfg.classifier_api_key.clone(),
        ClassifierSettings {
            base_url: cfg.classifier_base_url.clone(),
            model: cfg.classifier_model.clone(),
            temperature: cfg.classifier_temperature,
            max_tokens: cfg.classifier_max_tokens,
            timeout: cfg.classifier_timeout,
        },
    )?);
    let classifier = ClassifierClient::new(port, cfg.classifier_timeout);
    classifier.set_chat_rules(cfg.chat_rules.clone());

    let store = Arc::new(JsonPatternStore::new(cfg.patterns_file.clone()));
    let patterns = Arc::new(PatternCache::new(store));

    modbot_telegram::router::run_polling(cfg, classifier, patterns)
        .await
        .map_err(|e| modbot_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
