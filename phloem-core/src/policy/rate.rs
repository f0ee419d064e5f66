//! Token-bucket rate budget
//!
//! The bucket refills continuously at `refill_rate` tokens per second up to `capacity`. One
//! token pays for one request. A connection may emit only while at least one whole token is
//! available; otherwise [`RateBudget::delay_until_ready`] tells the caller how long to sleep.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Rate limit configuration (per connection)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct RateLimitConfig {
    /// Requests per second on each connection
    pub requests_per_second: f64,
    /// Bucket capacity (maximum burst)
    #[serde(default = "default_burst")]
    pub burst: u32,
}

fn default_burst() -> u32 {
    1
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.requests_per_second.is_finite() || self.requests_per_second <= 0.0 {
            return Err(ConfigError::InvalidRateLimit(self.requests_per_second));
        }
        if self.burst == 0 {
            return Err(ConfigError::InvalidRateLimit(0.0));
        }
        Ok(())
    }
}

/// Per-connection token bucket
#[derive(Debug, Clone)]
pub struct RateBudget {
    capacity: f64,
    /// Tokens per nanosecond
    refill_per_ns: f64,
    tokens: f64,
    last_refill_ns: u64,
}

impl RateBudget {
    /// Create a full bucket at `now_ns`
    pub fn new(config: &RateLimitConfig, now_ns: u64) -> Self {
        let capacity = f64::from(config.burst.max(1));
        Self {
            capacity,
            refill_per_ns: config.requests_per_second / NANOS_PER_SEC,
            tokens: capacity,
            last_refill_ns: now_ns,
        }
    }

    fn refill(&mut self, now_ns: u64) {
        let elapsed = now_ns.saturating_sub(self.last_refill_ns);
        self.last_refill_ns = self.last_refill_ns.max(now_ns);
        self.tokens = (self.tokens + elapsed as f64 * self.refill_per_ns).min(self.capacity);
    }

    /// Nanoseconds until one token is available (0 when ready)
    pub fn delay_until_ready(&mut self, now_ns: u64) -> u64 {
        self.refill(now_ns);
        if self.tokens >= 1.0 {
            return 0;
        }
        ((1.0 - self.tokens) / self.refill_per_ns).ceil() as u64
    }

    /// Absolute time at which one token is available
    pub fn ready_at(&mut self, now_ns: u64) -> u64 {
        now_ns.saturating_add(self.delay_until_ready(now_ns))
    }

    /// Whole tokens available at `now_ns`
    pub fn available(&mut self, now_ns: u64) -> u32 {
        self.refill(now_ns);
        self.tokens.floor() as u32
    }

    /// Take `count` tokens if that many are available
    pub fn try_consume(&mut self, now_ns: u64, count: u32) -> bool {
        self.refill(now_ns);
        let wanted = f64::from(count);
        if self.tokens >= wanted {
            self.tokens -= wanted;
            true
        } else {
            false
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}
