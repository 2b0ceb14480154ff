//! The three baseline tool implementations named in spec §4.2.

#[cfg(feature = "file")]
pub mod file;

#[cfg(feature = "shell")]
pub mod shell;

#[cfg(feature = "web-search")]
pub mod web_search;

/// Shared helpers for building `ToolConfig`s.
pub mod common {
    use conductor_core::ToolConfig;

    pub fn schema(properties: serde_json::Value, required: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn tool_config(
        name: &str,
        description: &str,
        parameters: serde_json::Value,
    ) -> ToolConfig {
        ToolConfig::new(name, description, parameters)
    }
}
