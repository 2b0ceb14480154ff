//! Retry policy (§4.4). Delay before attempt `k` (1-indexed) under
//! exponential backoff: `d_k = clamp(initialDelay · multiplier^(k-1),
//! initialDelay, maxDelay)`, optionally perturbed by uniform jitter in
//! `[-jitterFactor·d_k, +jitterFactor·d_k]`.

use std::future::Future;
use std::time::{Duration, Instant};

use conductor_core::{ConductorResult, RetrySettings, RetryStrategy, StructuredError};
use rand::Rng;

/// Computes the unjittered delay before attempt `k` (1-indexed) per
/// `settings.strategy`.
fn base_delay(settings: &RetrySettings, attempt: u32) -> Duration {
    let initial = Duration::from_millis(settings.initial_delay_ms);
    let max = Duration::from_millis(settings.max_delay_ms);
    match settings.strategy {
        RetryStrategy::None => Duration::ZERO,
        RetryStrategy::FixedDelay => initial.min(max),
        RetryStrategy::ExponentialBackoff => {
            let exp = settings.multiplier.powi((attempt - 1) as i32);
            let millis = (settings.initial_delay_ms as f64 * exp).max(settings.initial_delay_ms as f64);
            Duration::from_millis(millis as u64).clamp(initial, max)
        }
    }
}

/// Applies uniform jitter in `[-jitterFactor·d, +jitterFactor·d]` to `d`,
/// floored at zero.
fn jittered(settings: &RetrySettings, d: Duration) -> Duration {
    if !settings.jitter_enabled || settings.jitter_factor <= 0.0 {
        return d;
    }
    let millis = d.as_millis() as f64;
    let spread = millis * settings.jitter_factor;
    let delta = rand::thread_rng().gen_range(-spread..=spread);
    let adjusted = (millis + delta).max(0.0);
    Duration::from_millis(adjusted as u64)
}

/// Runs `attempt_fn` under the retry policy in `settings`. `attempt_fn` is
/// called with the 1-indexed attempt number. Stops when attempts reach
/// `maxAttempts`, cumulative wait exceeds `maxTotalDuration`, or the error
/// is non-retryable (`StructuredError::retryable == false`).
pub async fn execute_with_retry<F, Fut, T>(settings: &RetrySettings, mut attempt_fn: F) -> ConductorResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ConductorResult<T>>,
{
    let max_total = Duration::from_millis(settings.max_total_duration_ms);
    let started = Instant::now();
    let mut last_err: Option<StructuredError> = None;

    for attempt in 1..=settings.max_attempts.max(1) {
        match attempt_fn(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retryable = err.retryable;
                last_err = Some(err);
                if attempt >= settings.max_attempts {
                    break;
                }
                if !retryable {
                    break;
                }
                if started.elapsed() >= max_total {
                    break;
                }
                let delay = jittered(settings, base_delay(settings, attempt));
                if started.elapsed() + delay > max_total {
                    break;
                }
                if delay > Duration::ZERO {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| StructuredError::internal("retry executor produced no result")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn settings(max_attempts: u32) -> RetrySettings {
        RetrySettings {
            max_attempts,
            strategy: RetryStrategy::ExponentialBackoff,
            initial_delay_ms: 10,
            max_delay_ms: 1_000,
            multiplier: 2.0,
            jitter_enabled: false,
            jitter_factor: 0.0,
            max_total_duration_ms: 60_000,
        }
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let attempts = AtomicU32::new(0);
        let result = execute_with_retry(&settings(3), |_| {
            let count = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if count < 3 {
                    Err(StructuredError::rate_limit("RATE_LIMIT", "try again"))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_after_one_attempt() {
        let attempts = AtomicU32::new(0);
        let result: ConductorResult<i32> = execute_with_retry(&settings(5), |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(StructuredError::auth("invalid api key")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_max_attempts_on_persistent_retryable_error() {
        let attempts = AtomicU32::new(0);
        let result: ConductorResult<i32> = execute_with_retry(&settings(3), |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(StructuredError::service_unavailable("DOWN", "still down")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn base_delay_follows_exponential_formula_with_clamping() {
        let s = settings(5);
        assert_eq!(base_delay(&s, 1), Duration::from_millis(10));
        assert_eq!(base_delay(&s, 2), Duration::from_millis(20));
        assert_eq!(base_delay(&s, 3), Duration::from_millis(40));
        let clamped = RetrySettings { max_delay_ms: 25, ..s };
        assert_eq!(base_delay(&clamped, 3), Duration::from_millis(25));
    }
}
