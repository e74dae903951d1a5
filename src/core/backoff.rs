//! Reconnect pacing.
//!
//! The bridge waits the same interval after every failed or ended
//! connection. There is no growth, no jitter and no attempt limit: the
//! supervisor keeps trying until it is shut down.
//!
//! ```ignore
//! let mut backoff = Backoff::new(Duration::from_secs(5));
//! tokio::time::sleep(backoff.next_sleep()).await;
//! backoff.reset(); // after a successful connect
//! ```

use std::time::Duration;

/// Default wait between connection attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Fixed-interval backoff with an attempt counter for log output.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Wait before every retry.
    delay: Duration,

    /// Consecutive retries since the last successful connect.
    attempt: u32,
}

impl Backoff {
    /// Creates a backoff that always waits `delay`.
    ///
    /// # Arguments
    /// - `delay`: Wait between two connection attempts, never grown
    pub fn new(delay: Duration) -> Self {
        Self { delay, attempt: 0 }
    }

    /// Returns the wait before the next attempt and counts it.
    pub fn next_sleep(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        self.delay
    }

    /// Call once a connection is fully established.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Attempts counted since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}
