//! Phloem Core Library
//!
//! Request synthesis engine for the phloem key-value load generator: key patterns, command
//! templates, traffic-log replay, cursor continuation, per-connection policies (rate budget,
//! reconnection), the transport/statistics interfaces and the threading runtime that drives
//! them.

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod policy;
pub mod seed;
pub mod stats;
pub mod threading;
pub mod timing;
pub mod transport;
pub mod workload;

pub use config::{EngineConfig, ValidatedEngine};
pub use engine::{Engine, RunReport};
pub use error::{Error, Result};
