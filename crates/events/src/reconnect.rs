//! Exponential-backoff timing for event bus reconnection.
//!
//! When the bus connection drops, the connection task waits on a
//! [`Backoff`] between attempts until either the connection is restored
//! or the [`CancellationToken`] is triggered.

use std::time::Duration;

use coldreach_core::config::BusConfig;
use tokio_util::sync::CancellationToken;

/// Floor for the first delay so a zero setting cannot spin.
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::from(&BusConfig::default())
    }
}

impl From<&BusConfig> for ReconnectConfig {
    fn from(config: &BusConfig) -> Self {
        Self {
            initial_delay: config.reconnect_initial_delay,
            max_delay: config.reconnect_max_delay,
            multiplier: config.reconnect_multiplier,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`ReconnectConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Delay sequence for one run of consecutive failures.
#[derive(Debug)]
pub struct Backoff {
    config: ReconnectConfig,
    delay: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(mut config: ReconnectConfig) -> Self {
        config.initial_delay = config.initial_delay.max(MIN_DELAY);
        Self {
            delay: config.initial_delay,
            config,
            attempt: 0,
        }
    }

    /// Failed attempts since the last [`reset`](Self::reset).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Start over after a successful connection.
    pub fn reset(&mut self) {
        self.delay = self.config.initial_delay;
        self.attempt = 0;
    }

    /// Record a failure and return how long to wait before retrying.
    pub fn next_wait(&mut self) -> Duration {
        let wait = self.delay;
        self.attempt += 1;
        self.delay = next_delay(self.delay, &self.config);
        wait
    }

    /// Sleep for the next delay, respecting cancellation.
    ///
    /// Returns `false` if `cancel` fired before the delay elapsed.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        let wait = self.next_wait();
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(wait) => true,
        }
    }
}
