//! Per-connection emission policy
//!
//! A [`ConnectionPolicy`] decides WHEN its connection may emit next. It combines two gates:
//! - connection health: requests only flow while `Connected`; after a transport error the
//!   connection backs off and reconnects (or is given up)
//! - an optional token bucket ([`RateBudget`]) that paces requests
//!
//! The worker asks every connection for its [`ConnectionPolicy::ready_at`] time and services
//! whichever is due first.

pub mod rate;
pub mod reconnect;

pub use rate::{RateBudget, RateLimitConfig};
pub use reconnect::{ReconnectConfig, ReconnectState};

use crate::error::TransportError;
use std::fmt;

/// Health of a logical connection
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionHealth {
    Connected,
    /// A transport error was observed and not yet handled
    Degraded,
    Reconnecting(ReconnectState),
    /// Given up; the connection issues no further requests or attempts
    Fatal,
}

impl fmt::Display for ConnectionHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionHealth::Connected => write!(f, "connected"),
            ConnectionHealth::Degraded => write!(f, "degraded"),
            ConnectionHealth::Reconnecting(state) => {
                write!(f, "reconnecting (attempt {})", state.attempts_made + 1)
            }
            ConnectionHealth::Fatal => write!(f, "fatal"),
        }
    }
}

/// Emission gate for one connection
#[derive(Debug)]
pub struct ConnectionPolicy {
    conn_id: usize,
    health: ConnectionHealth,
    reconnect: ReconnectConfig,
    budget: Option<RateBudget>,
}

impl ConnectionPolicy {
    pub fn new(
        conn_id: usize,
        reconnect: ReconnectConfig,
        rate_limit: Option<&RateLimitConfig>,
        now_ns: u64,
    ) -> Self {
        Self {
            conn_id,
            health: ConnectionHealth::Connected,
            reconnect,
            budget: rate_limit.map(|config| RateBudget::new(config, now_ns)),
        }
    }

    /// Absolute time at which the connection can next make progress
    ///
    /// While connected this is when the rate budget holds a token; while reconnecting it is
    /// when the next attempt is due. `None` once the connection is fatal.
    pub fn ready_at(&mut self, now_ns: u64) -> Option<u64> {
        match &self.health {
            ConnectionHealth::Fatal => None,
            ConnectionHealth::Reconnecting(state) => Some(state.next_attempt_ns),
            ConnectionHealth::Degraded => Some(now_ns),
            ConnectionHealth::Connected => match &mut self.budget {
                Some(budget) => Some(budget.ready_at(now_ns)),
                None => Some(now_ns),
            },
        }
    }

    /// Claim up to `wanted` request slots at `now_ns`, returns how many may be sent
    ///
    /// Without a rate limit every wanted slot is granted.
    pub fn take_tokens(&mut self, now_ns: u64, wanted: usize) -> usize {
        if self.health != ConnectionHealth::Connected || wanted == 0 {
            return 0;
        }
        let Some(budget) = &mut self.budget else {
            return wanted;
        };
        let granted = budget.available(now_ns).min(u32::try_from(wanted).unwrap_or(u32::MAX));
        if granted > 0 && budget.try_consume(now_ns, granted) {
            granted as usize
        } else {
            0
        }
    }

    /// A request completed on the connection
    pub fn on_success(&mut self) {
        if self.health == ConnectionHealth::Degraded {
            self.health = ConnectionHealth::Connected;
        }
    }

    /// A request failed at the transport level
    ///
    /// Moves to `Reconnecting` when reconnection is enabled, `Fatal` otherwise.
    pub fn on_transport_error(&mut self, now_ns: u64, error: &TransportError) {
        if matches!(self.health, ConnectionHealth::Fatal | ConnectionHealth::Reconnecting(_)) {
            return;
        }
        self.health = ConnectionHealth::Degraded;

        if !self.reconnect.enabled {
            tracing::error!(
                "Connection {} failed: {} (reconnection disabled, giving up)",
                self.conn_id,
                error
            );
            self.health = ConnectionHealth::Fatal;
            return;
        }

        let state = ReconnectState::new(&self.reconnect, now_ns);
        tracing::warn!(
            "Connection {} failed: {}; reconnect attempt 1/{} in {:?}",
            self.conn_id,
            error,
            state.max_attempts,
            state.delay()
        );
        self.health = ConnectionHealth::Reconnecting(state);
    }

    /// Outcome of a reconnection attempt made at `now_ns`
    pub fn on_reconnect_result(&mut self, now_ns: u64, connected: bool) {
        let ConnectionHealth::Reconnecting(state) = &mut self.health else {
            return;
        };

        if connected {
            tracing::info!(
                "Connection {} re-established after {} failed attempt(s)",
                self.conn_id,
                state.attempts_made
            );
            self.health = ConnectionHealth::Connected;
            return;
        }

        if state.record_failure(now_ns) {
            tracing::warn!(
                "Connection {} reconnect attempt {}/{} failed; next attempt in {:?}",
                self.conn_id,
                state.attempts_made,
                state.max_attempts,
                state.delay()
            );
        } else {
            tracing::error!(
                "Connection {} giving up after {} failed reconnect attempts",
                self.conn_id,
                state.attempts_made
            );
            self.health = ConnectionHealth::Fatal;
        }
    }

    /// Whether a reconnection attempt is due at `now_ns`
    pub fn needs_reconnect(&self, now_ns: u64) -> bool {
        match &self.health {
            ConnectionHealth::Reconnecting(state) => now_ns >= state.next_attempt_ns,
            _ => false,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.health == ConnectionHealth::Fatal
    }

    pub fn is_connected(&self) -> bool {
        self.health == ConnectionHealth::Connected
    }

    pub fn health(&self) -> &ConnectionHealth {
        &self.health
    }

    pub fn reconnect_config(&self) -> &ReconnectConfig {
        &self.reconnect
    }

    pub fn conn_id(&self) -> usize {
        self.conn_id
    }
}
