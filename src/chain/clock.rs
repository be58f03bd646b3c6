//! Time source and retry pacing

use crate::config::ChainConfig;
use std::time::{Duration, SystemTime};

/// Wall clock plus blocking sleep, swappable in tests
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
    fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Delay before retry number `attempt + 1`
///
/// `base * multiplier^(attempt - 1)`, capped at `max`. A multiplier of 1.0
/// gives a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub multiplier: f64,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base: delay,
            multiplier: 1.0,
            max: delay,
        }
    }

    pub fn from_config(config: &ChainConfig) -> Self {
        Self {
            base: Duration::from_secs(config.retry_backoff_secs),
            multiplier: config.backoff_multiplier.max(1.0),
            max: Duration::from_secs(config.max_backoff_secs.max(config.retry_backoff_secs)),
        }
    }

    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(scaled)
    }
}
