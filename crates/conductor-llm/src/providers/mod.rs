//! Concrete `Provider` adapters. Default features enable `openai` and
//! `anthropic`; `azure`/`ollama` are optional, zero-additional-dependency
//! feature flags (all providers share the `reqwest` client already pulled
//! in by the default two).

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "azure")]
pub mod azure;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicConfig, AnthropicProvider};
#[cfg(feature = "azure")]
pub use azure::{AzureOpenAiConfig, AzureOpenAiProvider};
#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider};
#[cfg(feature = "openai")]
pub use openai::{OpenAiConfig, OpenAiProvider};
