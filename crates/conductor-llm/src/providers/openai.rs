//! OpenAI-compatible provider (default feature `openai`). Also backs
//! LocalAI and any other OpenAI-wire-compatible endpoint by pointing
//! `base_url` elsewhere.

use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult};
use serde::Deserialize;
use serde_json::json;

use crate::provider::{normalize_name, Provider, ProviderInfo};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_secs: 60,
            temperature: 0.7,
            max_tokens: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> ConductorResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ConductorError::auth("OpenAI provider requires an API key"));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConductorError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn generate(&self, prompt: &str) -> ConductorResult<String> {
        let mut body = json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.config.temperature,
        });
        if let Some(max_tokens) = self.config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ConductorError::network(format!("OpenAI request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ConductorError::classify(
                format!("OpenAI returned HTTP {}: {text}", status.as_u16()),
                format!("OPENAI_HTTP_{}", status.as_u16()),
            ));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ConductorError::internal(format!("failed to parse OpenAI response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ConductorError::internal("OpenAI response had no message content"))
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: normalize_name("openai"),
            model: self.config.model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_api_key() {
        let config = OpenAiConfig::new("", "gpt-4o-mini");
        assert!(OpenAiProvider::new(config).is_err());
    }

    #[test]
    fn info_reports_normalized_name_and_raw_model() {
        let provider = OpenAiProvider::new(OpenAiConfig::new("sk-test", "gpt-4o-mini")).unwrap();
        let info = provider.info();
        assert_eq!(info.name, "openai");
        assert_eq!(info.model, "gpt-4o-mini");
    }
}
