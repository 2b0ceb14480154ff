//! web-search (C2): issues a query to a configured search endpoint and
//! returns a bounded list of `(title, url, snippet)`. Runs as a stub that
//! returns an empty result set when no endpoint is configured (spec §4.2).

use async_trait::async_trait;
use conductor_core::{StructuredError, Tool, ToolConfig, ToolInput, ToolResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::common::{schema, tool_config};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

pub struct WebSearchTool {
    endpoint: Option<String>,
    client: reqwest::Client,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            endpoint,
            client: reqwest::Client::new(),
            max_results: 10,
        }
    }

    pub fn with_max_results(mut self, n: usize) -> Self {
        self.max_results = n;
        self
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web-search"
    }

    fn config(&self) -> ToolConfig {
        tool_config(
            "web-search",
            "Searches the configured web-search endpoint and returns a bounded list of results.",
            schema(
                serde_json::json!({
                    "query": {
                        "type": "string",
                        "description": "The search query",
                    },
                }),
                &["query"],
            ),
        )
    }

    async fn invoke(&self, input: ToolInput) -> ToolResult {
        let query: String = match input.require_arg("query") {
            Ok(q) => q,
            Err(e) => return ToolResult::error(self.name(), e),
        };

        let Some(endpoint) = &self.endpoint else {
            debug!("web-search has no configured endpoint; returning stub empty result");
            return ToolResult::success(self.name(), serde_json::to_string(&Vec::<SearchHit>::new()).unwrap());
        };

        let response = self
            .client
            .get(endpoint)
            .query(&[("q", query.as_str()), ("limit", &self.max_results.to_string())])
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => return ToolResult::error(self.name(), StructuredError::network(e.to_string())),
        };

        if !response.status().is_success() {
            let status = response.status();
            return ToolResult::error(
                self.name(),
                StructuredError::classify(format!("search endpoint returned HTTP {status}"), "SEARCH_HTTP_ERROR"),
            );
        }

        let hits: Vec<SearchHit> = match response.json().await {
            Ok(h) => h,
            Err(e) => return ToolResult::error(self.name(), StructuredError::validation(e.to_string())),
        };

        let bounded: Vec<SearchHit> = hits.into_iter().take(self.max_results).collect();
        match serde_json::to_string(&bounded) {
            Ok(json) => ToolResult::success(self.name(), json),
            Err(e) => ToolResult::error(self.name(), StructuredError::internal(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_mode_returns_empty_results_without_endpoint() {
        let tool = WebSearchTool::new(None);
        let result = tool
            .invoke(ToolInput::new(serde_json::json!({"query": "conductor rust"})))
            .await;
        assert!(result.ok);
        let hits: Vec<SearchHit> = serde_json::from_str(&result.output.unwrap()).unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn missing_query_is_validation_error() {
        let tool = WebSearchTool::new(None);
        let result = tool.invoke(ToolInput::new(serde_json::json!({}))).await;
        assert!(!result.ok);
        assert_eq!(result.error.unwrap().category, conductor_core::ErrorCategory::Validation);
    }
}
