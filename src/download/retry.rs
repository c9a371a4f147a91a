//! Fixed-delay retry policy for downloads and batch processing.
//!
//! Every failed attempt is retried until the attempt budget is spent; the
//! delay between attempts is constant.
//!
//! ```
//! use nfe_core::download::{RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::interactive();
//! match policy.should_retry(1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {delay:?} (attempt {attempt})");
//!     }
//!     RetryDecision::DoNotRetry { reason } => println!("Not retrying: {reason}"),
//! }
//! ```

use std::time::Duration;

use tracing::debug;

use super::constants::{
    BATCH_MAX_ATTEMPTS, BATCH_RETRY_DELAY, INTERACTIVE_MAX_ATTEMPTS, INTERACTIVE_RETRY_DELAY,
};

/// Decision on whether to try again after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then run attempt number `attempt`.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// The upcoming attempt number (1-indexed).
        attempt: u32,
    },

    /// Give up.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Attempt budget and constant delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::interactive()
    }
}

impl RetryPolicy {
    /// Creates a policy. `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Three attempts, five seconds apart.
    #[must_use]
    pub fn interactive() -> Self {
        Self::new(INTERACTIVE_MAX_ATTEMPTS, INTERACTIVE_RETRY_DELAY)
    }

    /// Five attempts, three seconds apart.
    #[must_use]
    pub fn batch() -> Self {
        Self::new(BATCH_MAX_ATTEMPTS, BATCH_RETRY_DELAY)
    }

    /// Maximum number of attempts, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay between attempts.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Decides what happens after attempt number `attempt` (1-indexed) failed.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }
        RetryDecision::Retry {
            delay: self.delay,
            attempt: attempt + 1,
        }
    }
}
