//! Ollama provider (optional feature `ollama`). Talks to a local (or
//! self-hosted) Ollama server's `/api/generate` endpoint — no API key.

use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult};
use serde::Deserialize;
use serde_json::json;

use crate::provider::{normalize_name, Provider, ProviderInfo};

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl OllamaConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: "http://localhost:11434".to_string(),
            timeout_secs: 120,
        }
    }
}

pub struct OllamaProvider {
    config: OllamaConfig,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig) -> ConductorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConductorError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn generate(&self, prompt: &str) -> ConductorResult<String> {
        let body = json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.config.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ConductorError::network(format!("Ollama request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ConductorError::classify(
                format!("Ollama returned HTTP {}: {text}", status.as_u16()),
                format!("OLLAMA_HTTP_{}", status.as_u16()),
            ));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ConductorError::internal(format!("failed to parse Ollama response: {e}")))?;
        Ok(parsed.response)
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: normalize_name("ollama"),
            model: self.config.model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_reports_normalized_name() {
        let provider = OllamaProvider::new(OllamaConfig::new("llama3")).unwrap();
        assert_eq!(provider.info().name, "ollama");
        assert_eq!(provider.info().model, "llama3");
    }
}
