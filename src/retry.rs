use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Per-attempt timeout plus exponential backoff for idempotent remote calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of the last attempt once the policy gives up.
#[derive(Debug)]
pub enum Exhausted<E> {
    TimedOut(Duration),
    Failed(E),
}

impl<E: Display> Display for Exhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Exhausted::TimedOut(d) => write!(f, "timed out after {:?}", d),
            Exhausted::Failed(e) => write!(f, "{e}"),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, still bounded by the timeout.
    pub fn once(self) -> Self {
        Self { attempts: 1, ..self }
    }

    /// Delay before attempt `attempt + 1`: base * 2^(attempt - 1), capped at `max_delay`,
    /// plus up to 10% jitter (still capped).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exp).min(self.max_delay);
        let jitter_ms = (delay.as_millis() as u64) / 10;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        } else {
            Duration::ZERO
        };
        (delay + jitter).min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or attempts run out.
    /// Timeouts are always retryable.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        is_retryable: impl Fn(&E) -> bool,
        mut op: F,
    ) -> Result<T, Exhausted<E>>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match tokio::time::timeout(self.timeout, op()).await {
                Ok(Ok(v)) => return Ok(v),
                Ok(Err(e)) if !is_retryable(&e) => return Err(Exhausted::Failed(e)),
                Ok(Err(e)) => Exhausted::Failed(e),
                Err(_) => Exhausted::TimedOut(self.timeout),
            };

            if attempt >= attempts {
                return Err(err);
            }

            let delay = self.backoff(attempt);
            tracing::warn!(
                call = label,
                attempt,
                max_attempts = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "remote call failed; retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let p = RetryPolicy {
            attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(1),
        };
        let first = p.backoff(1);
        assert!(first >= Duration::from_secs(1) && first < Duration::from_millis(1100));
        let second = p.backoff(2);
        assert!(second >= Duration::from_secs(2) && second < Duration::from_millis(2200));
        assert_eq!(p.backoff(30), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out: Result<u32, Exhausted<String>> = fast()
            .run("test", |_| true, move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("transient {n}"))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(out.unwrap(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out: Result<(), Exhausted<String>> = fast()
            .run("test", |_| false, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("denied".to_string())
            })
            .await;
        assert!(matches!(out, Err(Exhausted::Failed(e)) if e == "denied"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_configured_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out: Result<(), Exhausted<String>> = fast()
            .run("test", |_| true, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("down".to_string())
            })
            .await;
        assert!(out.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn slow_attempts_time_out() {
        let policy = RetryPolicy {
            timeout: Duration::from_millis(10),
            ..fast()
        }
        .once();
        let out: Result<(), Exhausted<String>> = policy
            .run("test", |_| true, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(out, Err(Exhausted::TimedOut(_))));
    }
}
