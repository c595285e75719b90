//! Bounded exponential backoff.

use rand::Rng;
use std::time::Duration;

pub const DEFAULT_BASE: Duration = Duration::from_secs(2);
pub const DEFAULT_CAP: Duration = Duration::from_secs(30);

/// Delay before retry `n` is `base · 2^(n-1)`, capped at `cap`.
///
/// With jitter enabled a random extra of up to `jitter` is added, still
/// never exceeding `cap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    pub jitter: Option<Duration>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            cap: DEFAULT_CAP,
            jitter: None,
        }
    }
}

impl Backoff {
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Deterministic part of the delay before retry `retry` (1-based).
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.cap)
    }

    pub fn delay(&self, retry: u32) -> Duration {
        let delay = self.base_delay(retry);
        match self.jitter {
            Some(jitter) if !jitter.is_zero() => {
                let extra_ms = rand::thread_rng().gen_range(0..=jitter.as_millis() as u64);
                (delay + Duration::from_millis(extra_ms)).min(self.cap)
            }
            _ => delay,
        }
    }
}
