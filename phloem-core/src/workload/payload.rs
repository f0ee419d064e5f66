//! Value payloads for `__data__` placeholders

use crate::error::ConfigError;
use crate::seed::RandomStream;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Value size strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum ValueSize {
    /// Every payload has the same size
    Fixed { size: usize },
    /// Sizes drawn uniformly from `[min, max]`
    Uniform { min: usize, max: usize },
}

impl Default for ValueSize {
    fn default() -> Self {
        ValueSize::Fixed { size: 32 }
    }
}

impl ValueSize {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ValueSize::Fixed { .. } => Ok(()),
            ValueSize::Uniform { min, max } if min > max => Err(ConfigError::InvalidValueSize(
                format!("uniform min ({min}) must be <= max ({max})"),
            )),
            ValueSize::Uniform { .. } => Ok(()),
        }
    }
}

/// Generates payload bytes, shared by all connections
#[derive(Debug)]
pub struct PayloadGenerator {
    size: ValueSize,
    random_data: bool,
    stream: Arc<RandomStream>,
    /// Prebuilt filler for fixed-size, non-random payloads
    fixed: Option<Vec<u8>>,
}

impl PayloadGenerator {
    pub fn new(size: ValueSize, random_data: bool, stream: Arc<RandomStream>) -> Self {
        let fixed = match size {
            ValueSize::Fixed { size } if !random_data => Some(vec![b'x'; size]),
            _ => None,
        };
        Self { size, random_data, stream, fixed }
    }

    /// Next payload; size and content come from one stream draw
    pub fn next_payload(&self) -> Vec<u8> {
        if let Some(fixed) = &self.fixed {
            return fixed.clone();
        }

        self.stream.draw(|rng| {
            let len = match self.size {
                ValueSize::Fixed { size } => size,
                ValueSize::Uniform { min, max } => rng.random_range(min..=max),
            };
            if self.random_data {
                rng.sample_iter(Alphanumeric).take(len).collect()
            } else {
                vec![b'x'; len]
            }
        })
    }

    pub fn value_size(&self) -> &ValueSize {
        &self.size
    }
}
