//! Injectable retry policies
//!
//! Retry behavior is a value passed to the transport and the upload engine,
//! not an ambient decorator: callers pick the budget per call site and tests
//! inject a zero-delay policy to run retry paths deterministically.

use std::time::Duration;

/// Bounded exponential backoff: `initial_delay * 2^(n-1)` before retry `n`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    /// Transport-level policy for control-plane GET/POST calls.
    pub fn transport() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
        }
    }

    /// Upload policy: single-shot PUT attempts and block retry rounds.
    pub fn upload() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
        }
    }

    /// Zero-delay policy with the given budget, for deterministic tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based). Retry 1 waits the
    /// initial delay; each further retry doubles it.
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.initial_delay * (1u32 << exponent)
    }
}
