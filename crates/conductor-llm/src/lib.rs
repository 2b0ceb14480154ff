//! Conductor LLM - Provider Core (C3) and the Resilience Layer (C4).
//!
//! [`Provider`] is the minimal contract a remote model endpoint implements.
//! Concrete adapters live under [`providers`] (`anthropic`, `openai`, and
//! the optional `azure`/`ollama` feature-gated ones). [`resilience`] wraps
//! any `Provider` in the decorator stack `RateLimiter → CircuitBreaker →
//! Retry → TimeLimiter`, with breaker/limiter state shared process-wide via
//! the registries keyed by `(providerName, operationName)`.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use conductor_core::ConductorConfig;
//! use conductor_llm::providers::{OpenAiConfig, OpenAiProvider};
//! use conductor_llm::resilience::{CircuitBreakerRegistry, RateLimiterRegistry, ResilientProvider};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let inner = Arc::new(OpenAiProvider::new(OpenAiConfig::new("sk-...", "gpt-4o"))?);
//! let config = ConductorConfig::default();
//! let breakers = CircuitBreakerRegistry::new();
//! let limiters = RateLimiterRegistry::new();
//! let provider = ResilientProvider::new(inner, "generate", &config, &breakers, &limiters);
//! # Ok(())
//! # }
//! ```

pub mod provider;
pub mod providers;
pub mod resilience;

pub use provider::{
    cosine, find_most_similar, normalize_name, EmbeddingProvider, ImageRef, Provider, ProviderInfo,
    ProviderRef, StreamingProvider, VisionProvider,
};
pub use resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use resilience::rate_limiter::{RateLimiterGate, RateLimiterRegistry};
pub use resilience::ResilientProvider;
