use std::time::Duration;

use colloquy_core::config::RetryConfig;
use rand::Rng;
use tracing::warn;

const DEFAULT_JITTER_RATIO: f64 = 0.3;

/// Exponential backoff with additive jitter.
///
/// Attempt `n` (1-based) waits `base * 2^(n-1)` plus a random jitter in
/// `[0, jitter_ratio * base]`, and never more than `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_ratio: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_ratio: DEFAULT_JITTER_RATIO,
        }
    }
}

impl BackoffPolicy {
    /// Build from the `[retry]` section. A negative, NaN or infinite
    /// `jitter_ratio` falls back to the default ratio.
    pub fn from_config(config: &RetryConfig) -> Self {
        let jitter_ratio = if config.jitter_ratio.is_finite() && config.jitter_ratio >= 0.0 {
            config.jitter_ratio
        } else {
            warn!(
                category = "api",
                jitter_ratio = config.jitter_ratio,
                "Invalid retry jitter ratio, using default"
            );
            DEFAULT_JITTER_RATIO
        };
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter_ratio,
        }
    }

    /// Delay before retry `attempt` without jitter, capped at `max_delay`.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.exponential_secs(attempt).min(self.max_secs()))
    }

    /// Delay before retry `attempt`, jitter included.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self.exponential_secs(attempt);
        let upper = self.jitter_ratio * self.base_delay.as_secs_f64();
        // `random_range` panics on a non-finite bound
        let jitter = if upper.is_finite() && upper > 0.0 {
            rand::rng().random_range(0.0..=upper)
        } else {
            0.0
        };
        Duration::from_secs_f64((exponential + jitter).min(self.max_secs()))
    }

    fn exponential_secs(&self, attempt: u32) -> f64 {
        let exponent = attempt.max(1).saturating_sub(1).min(62) as i32;
        self.base_delay.as_secs_f64() * 2f64.powi(exponent)
    }

    fn max_secs(&self) -> f64 {
        self.max_delay.as_secs_f64()
    }
}
