//! Time Limiter (§4.4). Each provider call runs under a deadline; on
//! expiry, the in-flight work is cancelled (best-effort, via dropping the
//! future at the `tokio::time::timeout` boundary) and the call fails with
//! `Timeout`.

use std::future::Future;
use std::time::Duration;

use conductor_core::{ConductorResult, StructuredError};

/// Runs `fut` with a `timeout` deadline. On expiry, `fut` is dropped (best-
/// effort cancellation of in-flight I/O) and a `Timeout` error is returned.
pub async fn with_timeout<Fut, T>(timeout: Duration, fut: Fut) -> ConductorResult<T>
where
    Fut: Future<Output = ConductorResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(StructuredError::timeout("CALL_TIMEOUT", format!("call exceeded {timeout:?}"))),
    }
}
