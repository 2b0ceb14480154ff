//! Rate Limiter (§4.4). Token bucket: `limitForPeriod` permits refreshed
//! every `limitRefreshPeriod`; a caller waits up to `timeoutDuration` for a
//! permit, otherwise fails with `RateLimit{code:RATE_LIMITER_TIMEOUT}`.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use conductor_core::{ConductorResult, RateLimiterSettings, StructuredError};
use dashmap::DashMap;
use governor::clock::{Clock, DefaultClock};
use governor::{Quota, RateLimiter as GovernorLimiter};

type Limiter = GovernorLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// One token bucket for a `(providerName, operationName)` pair.
pub struct RateLimiterGate {
    limiter: Limiter,
    timeout: Duration,
}

impl RateLimiterGate {
    pub fn new(settings: &RateLimiterSettings) -> Self {
        let permits = NonZeroU32::new(settings.limit_for_period.max(1)).unwrap();
        let period = Duration::from_millis(settings.limit_refresh_period_ms.max(1));
        // Integer division can truncate to zero when the period is smaller
        // than the permit count; governor refuses a zero-duration quota, so
        // the per-permit interval is floored at 1ns.
        let per_permit = (period / permits.get()).max(Duration::from_nanos(1));
        let quota = Quota::with_period(per_permit).unwrap().allow_burst(permits);
        Self {
            limiter: GovernorLimiter::direct(quota),
            timeout: Duration::from_millis(settings.timeout_ms),
        }
    }

    /// Waits for a permit up to `timeout_ms`. Fails with
    /// `RateLimit{RATE_LIMITER_TIMEOUT}` if none becomes available in time.
    pub async fn acquire(&self) -> ConductorResult<()> {
        tokio::time::timeout(self.timeout, async {
            loop {
                match self.limiter.check() {
                    Ok(()) => return,
                    Err(not_until) => {
                        let clock = DefaultClock::default();
                        let wait = not_until.wait_time_from(clock.now());
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        })
        .await
        .map_err(|_| StructuredError::rate_limit("RATE_LIMITER_TIMEOUT", "timed out waiting for a rate limiter permit"))
    }
}

/// Process-wide registry of rate limiter gates keyed by `(providerName,
/// operationName)`, initialized on first use and never replaced (§9).
#[derive(Default, Clone)]
pub struct RateLimiterRegistry {
    gates: Arc<DashMap<(String, String), Arc<RateLimiterGate>>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, provider: &str, operation: &str, settings: &RateLimiterSettings) -> Arc<RateLimiterGate> {
        self.gates
            .entry((provider.to_string(), operation.to_string()))
            .or_insert_with(|| Arc::new(RateLimiterGate::new(settings)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_calls_within_the_period_limit() {
        let gate = RateLimiterGate::new(&RateLimiterSettings {
            limit_for_period: 2,
            limit_refresh_period_ms: 1_000,
            timeout_ms: 10,
        });
        assert!(gate.acquire().await.is_ok());
        assert!(gate.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn times_out_when_bucket_is_exhausted() {
        let gate = RateLimiterGate::new(&RateLimiterSettings {
            limit_for_period: 1,
            limit_refresh_period_ms: 5_000,
            timeout_ms: 20,
        });
        gate.acquire().await.unwrap();
        let result = gate.acquire().await;
        let err = result.unwrap_err();
        assert_eq!(err.code, "RATE_LIMITER_TIMEOUT");
    }

    #[test]
    fn construction_does_not_panic_when_period_divides_to_zero() {
        let gate = RateLimiterGate::new(&RateLimiterSettings {
            limit_for_period: 100,
            limit_refresh_period_ms: 50,
            timeout_ms: 10,
        });
        let _ = gate;
    }

    #[test]
    fn registry_returns_the_same_gate_for_the_same_key() {
        let registry = RateLimiterRegistry::new();
        let settings = RateLimiterSettings::default();
        let a = registry.get_or_create("openai", "generate", &settings);
        let b = registry.get_or_create("openai", "generate", &settings);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
