use std::future::Future;
use std::time::Duration;

use scrivener_core::config::PipelineSettings;
use scrivener_core::Result;

/// Exponential backoff for transient upstream failures. Other errors return at once.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(s: &PipelineSettings) -> Self {
        Self {
            max_attempts: s.max_attempts.max(1),
            base_delay: Duration::from_millis(s.base_backoff_ms),
            max_delay: Duration::from_millis(s.max_backoff_ms.max(s.base_backoff_ms)),
        }
    }

    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(what, attempt, delay_ms = delay.as_millis() as u64, error = %e, "transient failure, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrivener_core::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy { max_attempts, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(4) }
    }

    #[test]
    fn delays_double_and_cap() {
        let p = RetryPolicy { max_attempts: 5, base_delay: Duration::from_millis(100), max_delay: Duration::from_millis(300) };
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out = fast(3)
            .run("test", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 { Err(Error::transient("embedding", "429")) } else { Ok(7) }
            })
            .await;
        assert_eq!(out, Ok(7));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_and_exhaustion_stop_retrying() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out: Result<()> = fast(3).run("test", move || async move { calls.fetch_add(1, Ordering::SeqCst); Err(Error::validation("bad")) }).await;
        assert!(out.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out: Result<()> = fast(2).run("test", move || async move { calls.fetch_add(1, Ordering::SeqCst); Err(Error::transient("llm", "timeout")) }).await;
        assert!(out.unwrap_err().is_transient());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
