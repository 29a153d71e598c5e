use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::config::{OpenAiConfig, MAX_OUTPUT_TOKENS, TEMPERATURE};
use crate::error::ProviderError;
use crate::types::Message;
use crate::util::http;

use super::LlmProvider;

/// OpenAI chat-completion provider. Sends the whole conversation window.
pub struct OpenAiChatProvider {
    api_key: String,
    api_base: String,
    model: String,
}

impl OpenAiChatProvider {
    pub fn new(api_key: String, api_base: Option<String>, model: String) -> Self {
        let base = api_base.unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Self {
            api_key,
            api_base: base.trim_end_matches('/').to_string(),
            model,
        }
    }

    pub fn from_config(config: &OpenAiConfig) -> Self {
        Self::new(
            config.api_key.clone(),
            Some(config.api_base.clone()),
            config.model.clone(),
        )
    }

    fn request_body(&self, history: &[Message]) -> serde_json::Value {
        let msgs: Vec<serde_json::Value> = history
            .iter()
            .map(|m| {
                json!({
                    "role": m.role,
                    "content": m.content,
                })
            })
            .collect();

        json!({
            "model": self.model,
            "messages": msgs,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "temperature": TEMPERATURE,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiChatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, history: &[Message]) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = self.request_body(history);

        debug!(
            "OpenAI request to {} with model {} ({} messages)",
            url,
            self.model,
            history.len()
        );

        let response = http::client()
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let data: serde_json::Value = response.json().await?;
        parse_chat_response(&data)
    }
}

/// Extract the trimmed text of the first choice.
pub fn parse_chat_response(data: &serde_json::Value) -> Result<String, ProviderError> {
    let choice = data
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| ProviderError::Parse("No choices in response".to_string()))?;

    let content = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProviderError::Parse("No message content in choice".to_string()))?;

    let text = content.trim();
    if text.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    Ok(text.to_string())
}
