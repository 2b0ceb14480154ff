//! Anthropic provider (default feature `anthropic`).

use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult};
use serde::Deserialize;
use serde_json::json;

use crate::provider::{normalize_name, Provider, ProviderInfo};

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub api_version: String,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            timeout_secs: 60,
            max_tokens: 4096,
            api_version: "2023-06-01".to_string(),
        }
    }
}

pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> ConductorResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ConductorError::auth("Anthropic provider requires an API key"));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConductorError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn generate(&self, prompt: &str) -> ConductorResult<String> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post(format!("{}/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| ConductorError::network(format!("Anthropic request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ConductorError::classify(
                format!("Anthropic returned HTTP {}: {text}", status.as_u16()),
                format!("ANTHROPIC_HTTP_{}", status.as_u16()),
            ));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ConductorError::internal(format!("failed to parse Anthropic response: {e}")))?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text)
            .collect();

        if text.is_empty() {
            Err(ConductorError::internal("Anthropic response had no text content"))
        } else {
            Ok(text)
        }
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: normalize_name("anthropic"),
            model: self.config.model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_api_key() {
        let config = AnthropicConfig::new("", "claude-3-5-sonnet-20241022");
        assert!(AnthropicProvider::new(config).is_err());
    }

    #[test]
    fn info_reports_normalized_name_and_raw_model() {
        let provider = AnthropicProvider::new(AnthropicConfig::new("sk-ant-test", "claude-3-5-sonnet-20241022")).unwrap();
        let info = provider.info();
        assert_eq!(info.name, "anthropic");
        assert_eq!(info.model, "claude-3-5-sonnet-20241022");
    }
}
