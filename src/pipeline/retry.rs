//! Retry with exponential backoff and a per-call timeout.
//!
//! Every external request (summary, image explanation, persona, answer)
//! goes through [`RetryPolicy::run`]. Each attempt is bounded by
//! `call_timeout`; a failed retryable attempt is followed by a delay of
//! `initial_delay * 2^(n-1)`, so three failures wait 2 s → 4 s → 8 s with the
//! default policy. A delay follows the last failure as well before control
//! returns to the caller, which then substitutes its fallback value or
//! surfaces the error.
//!
//! Non-retryable failures (see [`CallError::is_retryable`]) stop immediately.

use crate::error::CallError;
use std::future::Future;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Attempt count, backoff and timeout for one kind of external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            call_timeout: Duration::from_secs(60),
        }
    }
}

/// Why [`RetryPolicy::run`] gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted {
    /// Attempts actually made.
    pub attempts: u32,
    /// The error from the final attempt.
    pub last_error: CallError,
}

impl RetryPolicy {
    /// Delay that follows the `failed_attempt`-th failure (1-based).
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        self.initial_delay.saturating_mul(1u32 << exponent)
    }

    /// Run `op` until it succeeds, fails non-retryably, or attempts run out.
    ///
    /// `label` identifies the call in logs, e.g. `"summary page 3"`.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let outcome = match timeout(self.call_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(CallError::Timeout {
                    secs: self.call_timeout.as_secs(),
                }),
            };

            let err = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{}: succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                warn!("{}: attempt {} failed (not retryable): {}", label, attempt, err);
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: err,
                });
            }

            let delay = self.delay_after(attempt);
            warn!(
                "{}: attempt {}/{} failed: {}; waiting {}ms",
                label,
                attempt,
                max_attempts,
                err,
                delay.as_millis()
            );
            sleep(delay).await;

            if attempt >= max_attempts {
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: err,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            call_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn delays_double() {
        let p = policy();
        assert_eq!(p.delay_after(1), Duration::from_secs(2));
        assert_eq!(p.delay_after(2), Duration::from_secs(4));
        assert_eq!(p.delay_after(3), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt_does_not_sleep() {
        let start = tokio::time::Instant::now();
        let v = policy()
            .run("t", || async { Ok::<_, CallError>(7) })
            .await
            .unwrap();
        assert_eq!(v, 7);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let start = tokio::time::Instant::now();
        let v = policy()
            .run("t", move || {
                let c = Arc::clone(&c);
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(CallError::Status {
                            code: 503,
                            message: "busy".into(),
                        })
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(v, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_waits_after_every_failure() {
        let start = tokio::time::Instant::now();
        let err = policy()
            .run("t", || async {
                Err::<(), _>(CallError::Transport("connection reset".into()))
            })
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(start.elapsed(), Duration::from_secs(2 + 4 + 8));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_hits_timeout() {
        let err = policy()
            .run("t", || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, CallError>(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.last_error, CallError::Timeout { secs: 10 });
        assert_eq!(err.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let start = tokio::time::Instant::now();
        let err = policy()
            .run("t", move || {
                c.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(CallError::Status {
                        code: 401,
                        message: "bad key".into(),
                    })
                }
            })
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
