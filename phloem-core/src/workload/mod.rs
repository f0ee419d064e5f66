//! Workload generation: keys and value payloads

pub mod keys;
pub mod payload;

pub use keys::{ClientPosition, KeyGenerator, KeyPattern, KeyRange};
pub use payload::{PayloadGenerator, ValueSize};
