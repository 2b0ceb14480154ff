//! Resilience Layer (C4): the four decorators wrapped around a `Provider`
//! in outermost-to-innermost order `RateLimiter → CircuitBreaker → Retry →
//! TimeLimiter → Provider` (§4.4).

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;
pub mod time_limiter;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conductor_core::{ConductorResult, RetrySettings};

use crate::provider::{Provider, ProviderInfo};
use circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry};
use conductor_core::ConductorConfig;
use rate_limiter::{RateLimiterGate, RateLimiterRegistry};

/// Wraps any `Provider` in the full resilience stack. Breaker and rate
/// limiter state are looked up from process-wide registries keyed by
/// `(provider_name, operation)`, per §3's invariant that this state is
/// shared across all agents.
pub struct ResilientProvider {
    inner: Arc<dyn Provider>,
    retry: RetrySettings,
    time_limit: Duration,
    breaker: Arc<CircuitBreaker>,
    rate_limiter: Arc<RateLimiterGate>,
}

impl ResilientProvider {
    /// `operation` names the call site (e.g. `"generate"`), forming the
    /// second half of the `(providerName, operationName)` breaker/limiter
    /// key alongside the inner provider's normalized name.
    pub fn new(
        inner: Arc<dyn Provider>,
        operation: &str,
        config: &ConductorConfig,
        breaker_registry: &CircuitBreakerRegistry,
        rate_limiter_registry: &RateLimiterRegistry,
    ) -> Self {
        let provider_name = inner.info().name;
        let breaker = breaker_registry.get_or_create(&provider_name, operation, &config.circuit_breaker);
        let rate_limiter = rate_limiter_registry.get_or_create(&provider_name, operation, &config.rate_limiter);
        Self {
            inner,
            retry: config.retry.clone(),
            time_limit: Duration::from_millis(config.time_limiter.timeout_ms),
            breaker,
            rate_limiter,
        }
    }
}

#[async_trait]
impl Provider for ResilientProvider {
    async fn generate(&self, prompt: &str) -> ConductorResult<String> {
        self.rate_limiter.acquire().await?;

        let inner = &self.inner;
        let retry_settings = &self.retry;
        let time_limit = self.time_limit;

        self.breaker
            .call(|| async move {
                retry::execute_with_retry(retry_settings, |_attempt| {
                    time_limiter::with_timeout(time_limit, inner.generate(prompt))
                })
                .await
            })
            .await
    }

    fn info(&self) -> ProviderInfo {
        self.inner.info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderInfo;
    use conductor_core::StructuredError;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        fail_first_n: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Provider for FlakyProvider {
        async fn generate(&self, _prompt: &str) -> ConductorResult<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_first_n {
                Err(StructuredError::rate_limit("RATE_LIMIT", "slow down"))
            } else {
                Ok("ok".to_string())
            }
        }

        fn info(&self) -> ProviderInfo {
            ProviderInfo { name: "flaky".into(), model: "test".into() }
        }
    }

    fn fast_config() -> ConductorConfig {
        let mut config = ConductorConfig::default();
        config.retry.max_attempts = 3;
        config.retry.initial_delay_ms = 1;
        config.retry.max_delay_ms = 2;
        config.retry.jitter_enabled = false;
        config.rate_limiter.limit_for_period = 1000;
        config.rate_limiter.timeout_ms = 1000;
        config.time_limiter.timeout_ms = 1000;
        config
    }

    #[tokio::test]
    async fn retries_through_the_full_stack_until_success() {
        let inner = Arc::new(FlakyProvider { fail_first_n: 2, calls: AtomicU32::new(0) });
        let config = fast_config();
        let breaker_registry = CircuitBreakerRegistry::new();
        let rate_limiter_registry = RateLimiterRegistry::new();
        let resilient = ResilientProvider::new(inner, "generate", &config, &breaker_registry, &rate_limiter_registry);

        let result = resilient.generate("hi").await.unwrap();
        assert_eq!(result, "ok");
    }
}
