//! Backoff pacing for registration attempts against the master.

use std::time::Duration;

/// Durations double on every retry until hitting the cap; a successful
/// subscription resets the sequence.
pub struct ExponentialBackoffStrategy {
    base_duration: Duration,
    cap: Duration,
    last_duration: Duration,
}

impl ExponentialBackoffStrategy {
    pub fn new(base_duration: Duration, cap: Duration) -> Self {
        Self {
            base_duration,
            cap,
            last_duration: Duration::from_secs(0),
        }
    }

    /// Resets the strategy after a success.
    pub fn reset(&mut self) {
        self.last_duration = Duration::from_secs(0);
    }

    /// Gets how long to wait before retrying.
    pub fn next_duration(&mut self) -> Duration {
        let next_duration = if self.last_duration == Duration::from_secs(0) {
            self.base_duration
        } else {
            self.last_duration * 2
        };
        let next_duration = next_duration.min(self.cap);
        self.last_duration = next_duration;
        next_duration
    }

    /// Waits the prescribed amount of time.
    pub async fn wait(&mut self) {
        tokio::time::sleep(self.next_duration()).await
    }
}
