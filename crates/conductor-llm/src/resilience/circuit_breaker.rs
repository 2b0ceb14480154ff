//! Circuit Breaker (§4.4). Per `(providerName, operationName)` state,
//! shared process-wide (§3 invariant), guarding calls through `Closed →
//! Open → Half-Open → Closed`.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use conductor_core::{CircuitBreakerSettings, ConductorResult, SlidingWindowType, StructuredError};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
struct CallOutcome {
    at: Instant,
    failed: bool,
    slow: bool,
}

struct Inner {
    state: CircuitState,
    window: VecDeque<CallOutcome>,
    opened_at: Option<Instant>,
    half_open_results: Vec<bool>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            window: VecDeque::new(),
            opened_at: None,
            half_open_results: Vec::new(),
        }
    }
}

/// One breaker instance for a `(providerName, operationName)` pair.
pub struct CircuitBreaker {
    settings: CircuitBreakerSettings,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(settings: CircuitBreakerSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    fn prune_window(&self, inner: &mut Inner) {
        if self.settings.sliding_window_type == SlidingWindowType::CountBased {
            while inner.window.len() as u64 > self.settings.sliding_window_size {
                inner.window.pop_front();
            }
        } else {
            let horizon = Duration::from_secs(self.settings.sliding_window_size);
            let now = Instant::now();
            while inner
                .window
                .front()
                .is_some_and(|o| now.duration_since(o.at) > horizon)
            {
                inner.window.pop_front();
            }
        }
    }

    fn evaluate_closed(&self, inner: &mut Inner) {
        self.prune_window(inner);
        let total = inner.window.len() as u64;
        if total < self.settings.minimum_calls {
            return;
        }
        let failures = inner.window.iter().filter(|o| o.failed).count() as f64;
        let slow = inner.window.iter().filter(|o| o.slow).count() as f64;
        let failure_rate = failures / total as f64 * 100.0;
        let slow_rate = slow / total as f64 * 100.0;
        if failure_rate >= self.settings.failure_rate_threshold || slow_rate >= self.settings.slow_call_rate_threshold {
            warn!(failure_rate, slow_rate, "circuit breaker opening");
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            inner.window.clear();
        }
    }

    /// Checks whether a call may proceed, transitioning `Open → Half-Open`
    /// once `waitDurationInOpenState` has elapsed. Returns an error without
    /// running anything when the breaker is open.
    fn admit(&self) -> ConductorResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or_else(Instant::now);
                let wait = Duration::from_millis(self.settings.wait_duration_in_open_state_ms);
                if opened_at.elapsed() >= wait {
                    debug!("circuit breaker half-opening after wait duration");
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_results.clear();
                    Ok(())
                } else {
                    Err(StructuredError::service_unavailable("CIRCUIT_OPEN", "circuit breaker is open"))
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_results.len() as u32 >= self.settings.permitted_calls_in_half_open_state {
                    Err(StructuredError::service_unavailable("CIRCUIT_OPEN", "half-open probe window exhausted"))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn record(&self, failed: bool, slow: bool) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.window.push_back(CallOutcome { at: Instant::now(), failed, slow });
                self.evaluate_closed(&mut inner);
            }
            CircuitState::HalfOpen => {
                inner.half_open_results.push(failed);
                if inner.half_open_results.len() as u32 >= self.settings.permitted_calls_in_half_open_state {
                    let total = inner.half_open_results.len() as f64;
                    let failures = inner.half_open_results.iter().filter(|f| **f).count() as f64;
                    let failure_rate = failures / total * 100.0;
                    if failure_rate < self.settings.failure_rate_threshold {
                        debug!("circuit breaker closing after successful half-open probe");
                        inner.state = CircuitState::Closed;
                        inner.window.clear();
                    } else {
                        warn!("circuit breaker reopening after failed half-open probe");
                        inner.state = CircuitState::Open;
                        inner.opened_at = Some(Instant::now());
                    }
                    inner.half_open_results.clear();
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Runs `f` under the breaker: fails fast with `CIRCUIT_OPEN` if the
    /// breaker won't admit the call, otherwise runs it and records the
    /// outcome (failure and slow-call status) against the sliding window.
    pub async fn call<F, Fut, T>(&self, f: F) -> ConductorResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ConductorResult<T>>,
    {
        self.admit()?;
        let started = Instant::now();
        let result = f().await;
        let elapsed = started.elapsed();
        let slow = elapsed >= Duration::from_millis(self.settings.slow_call_duration_threshold_ms);
        self.record(result.is_err(), slow);
        result
    }
}

/// Process-wide registry of breaker instances keyed by `(providerName,
/// operationName)`, initialized on first use and never replaced (§9).
#[derive(Default, Clone)]
pub struct CircuitBreakerRegistry {
    breakers: Arc<DashMap<(String, String), Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, provider: &str, operation: &str, settings: &CircuitBreakerSettings) -> Arc<CircuitBreaker> {
        self.breakers
            .entry((provider.to_string(), operation.to_string()))
            .or_insert_with(|| Arc::new(CircuitBreaker::new(settings.clone())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CircuitBreakerSettings {
        CircuitBreakerSettings {
            sliding_window_type: SlidingWindowType::CountBased,
            sliding_window_size: 10,
            minimum_calls: 10,
            failure_rate_threshold: 50.0,
            slow_call_duration_threshold_ms: 10_000,
            slow_call_rate_threshold: 100.0,
            wait_duration_in_open_state_ms: 50,
            permitted_calls_in_half_open_state: 2,
        }
    }

    #[tokio::test]
    async fn opens_after_failure_rate_threshold_met() {
        let breaker = CircuitBreaker::new(settings());
        for _ in 0..10 {
            let _: ConductorResult<()> = breaker.call(|| async { Err(StructuredError::internal("boom")) }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let result: ConductorResult<()> = breaker.call(|| async { Ok(()) }).await;
        let err = result.unwrap_err();
        assert_eq!(err.code, "CIRCUIT_OPEN");
    }

    #[tokio::test]
    async fn half_open_probes_close_circuit_on_success() {
        let breaker = CircuitBreaker::new(settings());
        for _ in 0..10 {
            let _: ConductorResult<()> = breaker.call(|| async { Err(StructuredError::internal("boom")) }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;

        for _ in 0..2 {
            let result: ConductorResult<()> = breaker.call(|| async { Ok(()) }).await;
            assert!(result.is_ok());
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_probe_failure_reopens_circuit() {
        let breaker = CircuitBreaker::new(settings());
        for _ in 0..10 {
            let _: ConductorResult<()> = breaker.call(|| async { Err(StructuredError::internal("boom")) }).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        for _ in 0..2 {
            let _: ConductorResult<()> = breaker.call(|| async { Err(StructuredError::internal("still down")) }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn registry_returns_the_same_breaker_for_the_same_key() {
        let registry = CircuitBreakerRegistry::new();
        let a = registry.get_or_create("openai", "generate", &settings());
        let b = registry.get_or_create("openai", "generate", &settings());
        assert!(Arc::ptr_eq(&a, &b));
    }
}
