use crate::core::error::GatewayError;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retries an async gateway call on transient failures.
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `base_delay_ms`: Delay before the first retry, doubled on every attempt
///
/// # Returns
/// Either the successful result or the error of the last attempt. Only
/// [`GatewayError::Unavailable`] is retried; unknown tickers and empty
/// ranges fail immediately.
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    retries: usize,
    base_delay_ms: u64,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 1;
    let mut delay_ms = base_delay_ms;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err @ GatewayError::Unavailable(_)) if attempt <= retries => {
                debug!(
                    "Attempt {}/{} failed: {}. Retrying in {}ms...",
                    attempt, retries, err, delay_ms
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = delay_ms.saturating_mul(2);
            }
            Err(err) => return Err(err),
        }
    }
}
