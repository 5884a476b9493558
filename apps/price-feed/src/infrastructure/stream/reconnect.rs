//! Reconnection Policy
//!
//! Exponential backoff with jitter for streaming reconnection. The delay for
//! a given attempt is a pure function of the attempt number and the config;
//! jitter is the only source of randomness.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Cap on the computed delay.
    pub max_delay: Duration,
    /// Growth factor per attempt (e.g. 2.0 doubles the delay).
    pub multiplier: f64,
    /// Jitter fraction (e.g. 0.2 = ±20% randomization).
    pub jitter_factor: f64,
    /// Attempt ceiling before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.2,
            max_attempts: 0, // Unlimited
        }
    }
}

/// Reconnection policy tracking the attempt counter across a reconnect cycle.
///
/// The counter persists through `Reconnecting → Connecting` transitions and
/// is reset only on a successful connection.
///
/// # Example
///
/// ```rust
/// use price_feed::infrastructure::stream::reconnect::{ReconnectConfig, ReconnectPolicy};
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
///
/// let delay = policy.next_delay();
/// assert!(delay.is_some());
///
/// // On a successful connection:
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// The un-jittered delay for a given attempt number.
    ///
    /// Grows as `initial_delay × multiplier^attempt`, capped at `max_delay`,
    /// and never below one millisecond.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let base = self.config.initial_delay.as_millis() as f64;
        let exponent = f64::from(attempt.min(63));
        let scaled = base * self.config.multiplier.powf(exponent);

        #[allow(clippy::cast_precision_loss)]
        let cap = self.config.max_delay.as_millis() as f64;
        let capped = if scaled.is_finite() { scaled.min(cap) } else { cap };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millis = capped.max(1.0) as u64;
        Duration::from_millis(millis)
    }

    /// Consume the next attempt and return its jittered delay.
    ///
    /// Returns `None` once the attempt ceiling is exhausted; the caller
    /// decides what exhaustion means (this policy does not).
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts > 0 && self.attempt_count >= self.config.max_attempts {
            return None;
        }

        let delay = self.apply_jitter(self.delay_for(self.attempt_count));
        self.attempt_count += 1;
        Some(delay)
    }

    /// Reset the counter after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Attempts consumed since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether another attempt is available.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// Apply uniform jitter within `±jitter_factor`, floored at 1 ms.
    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted = (base_millis + jitter).max(1.0) as u64;
        Duration::from_millis(adjusted)
    }
}
