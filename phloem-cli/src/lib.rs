//! Phloem CLI library
//!
//! This library exposes configuration and output types for testing and potential reuse.

pub mod completions;
pub mod config;
pub mod output;
