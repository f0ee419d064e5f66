//! Common utilities for phloem
//!
//! This crate provides shared utilities used by multiple phloem crates:
//! - `distributions`: Statistical distributions for key generation

pub mod distributions;

pub use distributions::{NormalDistribution, ZipfianDistribution};
