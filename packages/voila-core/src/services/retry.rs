//! Retry logic for upstream API calls.
//!
//! Bounded retries with a fixed delay between attempts. The booking commit
//! uses two attempts with one second in between; a call that fails through
//! its whole budget surfaces as `UpstreamUnavailable`.

use std::time::Duration;

use crate::error::{BridgeError, BridgeResult};

/// Executes an upstream call with a bounded retry budget.
///
/// # Arguments
/// * `name` - Call name for logging
/// * `attempts` - Total attempts, including the first
/// * `delay` - Wait between attempts
/// * `operation` - Closure that performs the call
pub async fn retry_api_call<T, F, Fut>(
    name: &str,
    attempts: u32,
    delay: Duration,
    mut operation: F,
) -> BridgeResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = BridgeResult<T>>,
{
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        if attempt > 1 {
            log::info!(
                "[Retry] Retrying {} (attempt {}/{}) after {:?}",
                name,
                attempt,
                attempts,
                delay
            );
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                log::warn!("[Retry] {} attempt {}/{} failed: {}", name, attempt, attempts, e);
                last_error = Some(e);
            }
        }
    }

    let detail = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no attempts made".to_string());
    Err(BridgeError::UpstreamUnavailable(format!(
        "{} failed after {} attempts: {}",
        name, attempts, detail
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn first_success_short_circuits() {
        let calls = AtomicU32::new(0);
        let result = retry_api_call("test", 2, Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, BridgeError>(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_attempt_can_recover() {
        let calls = AtomicU32::new(0);
        let result = retry_api_call("test", 2, Duration::from_secs(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(BridgeError::UpstreamUnavailable("503".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_reports_upstream_unavailable() {
        let calls = AtomicU32::new(0);
        let result: BridgeResult<()> = retry_api_call("booking", 2, Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BridgeError::UpstreamUnavailable("500".into())) }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.code(), "upstream_unavailable");
        // Exactly the budget, never more.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
