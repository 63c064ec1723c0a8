//! OpenAI-compatible classifier adapter.
//!
//! Talks to any `chat/completions` endpoint (OpenAI, io.net, local servers).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use modbot_core::{
    errors::Error,
    ports::{ClassifierPort, ClassifierRequest},
    Result,
};

#[derive(Clone, Debug)]
pub struct ClassifierSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct OpenAiClassifier {
    api_key: String,
    settings: ClassifierSettings,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatTurn {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiClassifier {
    pub fn new(api_key: impl Into<String>, settings: ClassifierSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::External(format!("classifier http client error: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            settings,
            http,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    fn body<'a>(&'a self, req: &ClassifierRequest) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.settings.model,
            messages: vec![
                ChatTurn {
                    role: "system".to_string(),
                    content: req.system_prompt.clone(),
                },
                ChatTurn {
                    role: "user".to_string(),
                    content: req.user_turn(),
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream: false,
        }
    }
}

#[async_trait]
impl ClassifierPort for OpenAiClassifier {
    async fn complete(&self, req: &ClassifierRequest) -> Result<String> {
        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.body(req))
            .send()
            .await
            .map_err(|e| Error::External(format!("classifier request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Classification(format!(
                "classifier request failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("classifier json error: {e}")))?;

        let text = first_content(parsed)?;
        tracing::debug!(model = %self.settings.model, chars = text.len(), "classifier replied");
        Ok(text)
    }
}

fn first_content(resp: ChatCompletionResponse) -> Result<String> {
    let text = resp
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(Error::Classification(
            "classifier returned empty content".to_string(),
        ));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(base_url: &str) -> OpenAiClassifier {
        OpenAiClassifier::new(
            "key",
            ClassifierSettings {
                base_url: base_url.to_string(),
                model: "meta-llama/Llama-3.3-70B-Instruct".to_string(),
                temperature: 0.7,
                max_tokens: 200,
                timeout: Duration::from_secs(30),
            },
        )
        .unwrap()
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        assert_eq!(
            classifier("https://api.example.com/v1/").endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn body_is_a_single_system_and_user_turn() {
        let c = classifier("https://api.example.com/v1");
        let req = ClassifierRequest {
            system_prompt: "be a moderator".to_string(),
            transcript: "[t] Ann: hi\nReview triggered by: Ann".to_string(),
            trigger_method: "link".to_string(),
        };
        let v = serde_json::to_value(c.body(&req)).unwrap();
        assert_eq!(v["model"], "meta-llama/Llama-3.3-70B-Instruct");
        assert_eq!(v["stream"], false);
        assert_eq!(v["max_tokens"], 200);
        let messages = v["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "be a moderator");
        assert_eq!(messages[1]["role"], "user");
        let user = messages[1]["content"].as_str().unwrap();
        assert!(user.contains("Detection method (hint only): link"));
        assert!(user.ends_with("Review triggered by: Ann"));
    }

    #[test]
    fn extracts_first_choice_content() {
        let resp: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"ACTION: none"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_content(resp).unwrap(), "ACTION: none");
    }

    #[test]
    fn empty_content_is_an_error() {
        let resp: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"  "}}]}"#).unwrap();
        assert!(first_content(resp).is_err());
        let resp: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(first_content(resp).is_err());
    }
}
