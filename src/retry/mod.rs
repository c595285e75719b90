//! Retry policy: bounded attempts with exponential backoff.
//!
//! [`RetryPolicy::execute`] runs an attempt, classifies the result, and
//! either returns it or sleeps and tries again. It never fails past its
//! own boundary: the caller always gets a terminal [`CallOutcome`].

use std::future::Future;
use tracing::warn;

mod backoff;
mod classify;

pub use backoff::Backoff;
pub use classify::CallOutcome;

/// Total tries per call, first attempt included.
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `action` until it yields a terminal outcome or the attempt bound
    /// is reached. `action` receives the 1-based attempt number.
    pub async fn execute<F, Fut>(&self, action: F) -> CallOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = CallOutcome>,
    {
        self.execute_counted(action).await.0
    }

    /// Like [`execute`](Self::execute), also reporting how many attempts ran.
    pub async fn execute_counted<F, Fut>(&self, mut action: F) -> (CallOutcome, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = CallOutcome>,
    {
        let mut attempt = 1;
        loop {
            let outcome = action(attempt).await;
            if !outcome.is_retryable() || attempt >= self.max_attempts {
                return (outcome, attempt);
            }

            let delay = self.backoff.delay(attempt);
            warn!(
                attempt,
                max_attempts = self.max_attempts,
                outcome = outcome.label(),
                status = outcome.status(),
                delay_ms = delay.as_millis() as u64,
                "Attempt failed — backing off before retry"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
