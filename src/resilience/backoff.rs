//! Exponential backoff with jitter for repeated accept failures.

use std::time::Duration;
use rand::Rng;

/// Tracks consecutive raw-accept failures and spaces out retries.
///
/// A listener whose `accept` keeps failing (descriptor exhaustion, for
/// instance) would otherwise spin the accept loop.
#[derive(Debug, Clone)]
pub struct AcceptBackoff {
    failures: u32,
    base_ms: u64,
    max_ms: u64,
}

impl AcceptBackoff {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self { failures: 0, base_ms, max_ms }
    }

    /// Record a failure and return how long to pause before the next accept.
    pub fn record_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        delay_for(self.failures, self.base_ms, self.max_ms)
    }

    /// A successful accept clears the streak.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

impl Default for AcceptBackoff {
    fn default() -> Self {
        Self::new(5, 1_000)
    }
}

fn delay_for(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponent = (attempt - 1).min(32);
    let capped = base_ms.saturating_mul(1u64 << exponent).min(max_ms);

    // Up to 10% jitter so several listeners don't retry in lockstep.
    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}
