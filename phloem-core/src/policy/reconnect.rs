//! Reconnection with exponential backoff
//!
//! ```text
//! Connected --transport error--> Degraded --enabled--> Reconnecting --ok--> Connected
//!                                   |                      |
//!                                   +--disabled--> Fatal <-+-- attempts_made == max_attempts
//! ```
//!
//! Attempt `k` (0-based) waits `base_delay * backoff_factor^k` before connecting.

use crate::error::ConfigError;
use crate::timing::duration_ns;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconnection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ReconnectConfig {
    /// Reconnect after transport errors instead of failing the connection
    #[serde(default)]
    pub enabled: bool,
    /// Failed reconnection attempts before the connection is given up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Multiplier applied to the delay after each failed attempt
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Delay before the first attempt
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    #[cfg_attr(feature = "schema", schemars(with = "String"))]
    pub base_delay: Duration,
    /// Re-send the requests that were in flight when the error hit (otherwise they are dropped
    /// and counted as failed)
    #[serde(default = "default_retry_failed_request")]
    pub retry_failed_request: bool,
    /// Proactively reconnect after this many completed requests
    #[serde(default)]
    pub interval: Option<u64>,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_base_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_retry_failed_request() -> bool {
    true
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: default_max_attempts(),
            backoff_factor: default_backoff_factor(),
            base_delay: default_base_delay(),
            retry_failed_request: default_retry_failed_request(),
            interval: None,
        }
    }
}

impl ReconnectConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval == Some(0) {
            return Err(ConfigError::InvalidReconnect("interval must be > 0".to_string()));
        }
        if !self.enabled {
            return Ok(());
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidReconnect("max_attempts must be > 0".to_string()));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ConfigError::InvalidReconnect(format!(
                "backoff_factor must be a finite value >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        Ok(())
    }
}

/// Backoff bookkeeping while a connection is being re-established
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectState {
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff_factor: f64,
    pub base_delay: Duration,
    /// When the next attempt may run
    pub next_attempt_ns: u64,
}

impl ReconnectState {
    /// Start backing off at `now_ns`; the first attempt waits `base_delay`
    pub fn new(config: &ReconnectConfig, now_ns: u64) -> Self {
        let mut state = Self {
            attempts_made: 0,
            max_attempts: config.max_attempts,
            backoff_factor: config.backoff_factor,
            base_delay: config.base_delay,
            next_attempt_ns: 0,
        };
        state.next_attempt_ns = now_ns.saturating_add(duration_ns(state.delay()));
        state
    }

    /// `base_delay * backoff_factor^attempts_made`
    pub fn delay(&self) -> Duration {
        let factor = self.backoff_factor.powi(self.attempts_made.min(i32::MAX as u32) as i32);
        let nanos = duration_ns(self.base_delay) as f64 * factor;
        if nanos.is_finite() && nanos < u64::MAX as f64 {
            Duration::from_nanos(nanos as u64)
        } else {
            Duration::from_nanos(u64::MAX)
        }
    }

    /// Record a failed attempt; returns false once attempts are exhausted
    pub fn record_failure(&mut self, now_ns: u64) -> bool {
        self.attempts_made += 1;
        if self.is_exhausted() {
            return false;
        }
        self.next_attempt_ns = now_ns.saturating_add(duration_ns(self.delay()));
        true
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }
}
