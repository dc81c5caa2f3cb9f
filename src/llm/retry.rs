//! Retry with exponential backoff.

use crate::config::RetrySettings;
use crate::error::{Result, TolkError};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// How often and how patiently a failed call is repeated.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries once and never waits.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Non-retryable errors are returned as-is. Exhausting the attempts on a
    /// retryable error yields [`TolkError::ProviderUnavailable`].
    pub async fn run<T, F, Fut>(&self, provider: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < self.max_attempts {
            if attempt > 0 {
                let delay = self.delay_for(attempt);
                warn!(
                    provider = %provider,
                    retry = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying LLM request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();
            match op().await {
                Ok(value) => {
                    info!(
                        provider = %provider,
                        latency_ms = start.elapsed().as_millis() as u64,
                        attempt = attempt + 1,
                        "LLM call succeeded"
                    );
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    error!(provider = %provider, error = %e, "LLM call failed permanently");
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        provider = %provider,
                        error = %e,
                        latency_ms = start.elapsed().as_millis() as u64,
                        retry = attempt,
                        "LLM call failed"
                    );
                    last_error = Some(e);
                    attempt += 1;
                }
            }
        }

        Err(TolkError::ProviderUnavailable {
            provider: provider.to_string(),
            attempts: attempt,
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    fn transient() -> TolkError {
        TolkError::Provider {
            provider: "test".to_string(),
            status: Some(503),
            message: "overloaded".to_string(),
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
        assert_eq!(policy.delay_for(3), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = fast(3)
            .run("test", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_unavailable() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = fast(3)
            .run("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            })
            .await;

        assert!(matches!(
            result,
            Err(TolkError::ProviderUnavailable { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = fast(3)
            .run("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TolkError::Provider {
                    provider: "test".to_string(),
                    status: Some(401),
                    message: "bad key".to_string(),
                })
            })
            .await;

        assert!(matches!(result, Err(TolkError::Provider { status: Some(401), .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
