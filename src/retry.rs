//! Retry-until-available loop for store connections.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::EtlError;

/// Backoff between connection attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound for the doubling delay.
    pub max_delay: Duration,
    /// Give up after this many attempts. `None` retries forever.
    pub max_attempts: Option<usize>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(100),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        self.initial_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

#[allow(async_fn_in_trait)]
pub trait Sleeper {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Calls `connect` until it succeeds.
///
/// Transient failures are retried per `policy`; any other error is returned
/// immediately.
pub async fn connect_with_retry<T, F, Fut, S>(
    store: &str,
    policy: &RetryPolicy,
    sleeper: &S,
    mut connect: F,
) -> Result<T, EtlError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EtlError>>,
    S: Sleeper,
{
    let mut attempt = 0usize;

    loop {
        attempt += 1;
        match connect().await {
            Ok(conn) => {
                info!(store, attempt, "connected");
                return Ok(conn);
            }
            Err(err) if err.is_transient() => {
                if policy.max_attempts.is_some_and(|max| attempt >= max) {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    store,
                    attempt,
                    error = %err,
                    retry_in = ?delay,
                    "store not reachable, retrying"
                );
                sleeper.sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
