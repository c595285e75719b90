//! Fixed-period tick schedule with an optional runtime bound.
//!
//! Slots sit at `start + k·period` for k ≥ 1. A tick that overruns its
//! slot makes the schedule skip the slots it missed rather than firing
//! them back to back.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextTick {
    /// Wait until this instant, then run a tick.
    At(Instant),
    /// No further slot fits in the runtime bound, which ends at this instant.
    RuntimeExhausted(Instant),
}

#[derive(Debug, Clone)]
pub struct Ticker {
    period: Duration,
    next: Instant,
    limit: Option<Instant>,
}

impl Ticker {
    pub fn new(start: Instant, period: Duration, max_runtime: Option<Duration>) -> Self {
        Self {
            period,
            next: start + period,
            limit: max_runtime.map(|runtime| start + runtime),
        }
    }

    /// The next slot at or after `now`.
    pub fn next_tick(&mut self, now: Instant) -> NextTick {
        if self.next < now {
            let behind = now.duration_since(self.next);
            let missed = behind.as_nanos().div_ceil(self.period.as_nanos());
            self.next += self.period.saturating_mul(missed.min(u32::MAX as u128) as u32);
        }
        match self.limit {
            Some(limit) if self.next > limit => NextTick::RuntimeExhausted(limit),
            _ => NextTick::At(self.next),
        }
    }

    /// Mark the current slot as consumed.
    pub fn fired(&mut self) {
        self.next += self.period;
    }
}
