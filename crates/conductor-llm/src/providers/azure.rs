//! Azure-OpenAI provider (optional feature `azure`). Same chat-completions
//! wire shape as [`super::openai`], but Azure routes by deployment name and
//! authenticates with an `api-key` header plus an `api-version` query param
//! instead of a bearer token.

use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult};
use serde::Deserialize;
use serde_json::json;

use crate::provider::{normalize_name, Provider, ProviderInfo};

#[derive(Debug, Clone)]
pub struct AzureOpenAiConfig {
    pub api_key: String,
    pub deployment: String,
    pub resource_endpoint: String,
    pub api_version: String,
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl AzureOpenAiConfig {
    pub fn new(api_key: impl Into<String>, deployment: impl Into<String>, resource_endpoint: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            deployment: deployment.into(),
            resource_endpoint: resource_endpoint.into(),
            api_version: "2024-02-15-preview".to_string(),
            timeout_secs: 60,
            temperature: 0.7,
        }
    }
}

pub struct AzureOpenAiProvider {
    config: AzureOpenAiConfig,
    client: reqwest::Client,
}

impl AzureOpenAiProvider {
    pub fn new(config: AzureOpenAiConfig) -> ConductorResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ConductorError::auth("Azure OpenAI provider requires an API key"));
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
impl Provider for AzureOpenAiProvider {
    async fn generate(&self, prompt: &str) -> ConductorResult<String> {
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.resource_endpoint.trim_end_matches('/'),
            self.config.deployment,
            self.config.api_version,
        );
        let body = json!({
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.config.temperature,
        });

        let response = self
            .client
            .post(url)
            .header("api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ConductorError::network(format!("Azure OpenAI request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ConductorError::classify(
                format!("Azure OpenAI returned HTTP {}: {text}", status.as_u16()),
                format!("AZURE_OPENAI_HTTP_{}", status.as_u16()),
            ));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ConductorError::internal(format!("failed to parse Azure OpenAI response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ConductorError::internal("Azure OpenAI response had no message content"))
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: normalize_name("azure-openai"),
            model: self.config.deployment.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_api_key() {
        let config = AzureOpenAiConfig::new("", "gpt-4o-deployment", "https://my-resource.openai.azure.com");
        assert!(AzureOpenAiProvider::new(config).is_err());
    }
}
