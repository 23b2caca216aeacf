use std::future::Future;
use std::time::Duration;

use rand::Rng as _;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// Exponential backoff with jitter for idempotent reads against the
/// platform API. Writes and token exchanges never go through this.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// No retries and no sleeping.
    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-indexed):
    /// `min(base * 2^retry, max) + jitter(0..base)`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(1u64.checked_shl(retry).unwrap_or(u64::MAX));
        let capped = exp_ms.min(self.max_delay.as_millis() as u64);
        let jitter = if base_ms > 0 {
            rand::thread_rng().gen_range(0..base_ms)
        } else {
            0
        };
        Duration::from_millis(capped + jitter)
    }
}

/// Run `operation` until it succeeds, the classifier aborts, or retries run out.
///
/// `label` only feeds the warning log so callers can tell retries apart.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    config: &RetryConfig,
    label: &str,
    classifier: C,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let total_attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                attempt += 1;
                if classifier(&e) == RetryAction::Abort || attempt >= total_attempts {
                    return Err(e);
                }
                let delay = config.delay_for_retry(attempt - 1);
                tracing::warn!(
                    target_label = label,
                    attempt,
                    total_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retryable error, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.base_delay, Duration::from_secs(5));
        assert_eq!(config.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_delay_doubles_per_retry() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(60),
        };
        let d = config.delay_for_retry(0).as_millis();
        assert!((200..400).contains(&d));
        let d = config.delay_for_retry(2).as_millis();
        assert!((800..1000).contains(&d));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig {
            max_retries: 10,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
        };
        let d = config.delay_for_retry(10);
        assert!(d >= Duration::from_secs(30) && d < Duration::from_secs(35));
    }

    #[test]
    fn test_zero_base_has_no_delay() {
        assert_eq!(RetryConfig::none().delay_for_retry(3), Duration::ZERO);
    }

    fn counting_op(
        calls: Arc<AtomicU32>,
        succeed_on: u32,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = Result<u32, String>>>> {
        move || {
            let calls = calls.clone();
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= succeed_on {
                    Ok(n)
                } else {
                    Err(format!("transient #{n}"))
                }
            })
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let config = RetryConfig {
            max_retries: 3,
            ..RetryConfig::none()
        };
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_with_backoff(
            &config,
            "test",
            |_| RetryAction::Retry,
            counting_op(calls.clone(), 3),
        )
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_abort_stops_immediately() {
        let config = RetryConfig {
            max_retries: 3,
            ..RetryConfig::none()
        };
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_with_backoff(
            &config,
            "test",
            |_| RetryAction::Abort,
            counting_op(calls.clone(), 10),
        )
        .await;
        assert_eq!(result.unwrap_err(), "transient #1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_returns_last_error() {
        let config = RetryConfig {
            max_retries: 2,
            ..RetryConfig::none()
        };
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_with_backoff(
            &config,
            "test",
            |_| RetryAction::Retry,
            counting_op(calls.clone(), 10),
        )
        .await;
        assert_eq!(result.unwrap_err(), "transient #3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
