//! Per-category request statistics
//!
//! Every completed (or failed) request is reported to a [`StatsSink`] under its category
//! label: the upper-cased verb for plain commands, `"<VERB> 0"` / `"<VERB> <cursor>"` for the
//! initial and continuation instances of cursor iteration.

use std::time::Duration;

pub mod collector;

pub use collector::{CategoryStats, CategoryStatsCollector};

/// Receiver of per-request outcomes
pub trait StatsSink {
    fn record(
        &mut self,
        category: &str,
        latency: Duration,
        bytes_sent: usize,
        bytes_received: usize,
        success: bool,
    );
}
