//! Key pattern generation
//!
//! A [`KeyGenerator`] produces integer keys inside a [`KeyRange`] following one of the
//! [`KeyPattern`] strategies. Sequential and Parallel generators keep a per-connection cursor;
//! Random, Gaussian and Zipfian generators draw from a shared [`RandomStream`] so that two runs
//! with the same seed draw the same multiset of keys regardless of thread interleaving.

use crate::error::ConfigError;
use crate::seed::RandomStream;
use phloem_common::{NormalDistribution, ZipfianDistribution};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Gaussian draws outside the range are redrawn this many times before clamping
const GAUSSIAN_MAX_REDRAWS: usize = 16;

/// Inclusive integer keyspace `[minimum, maximum]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRange {
    minimum: u64,
    maximum: u64,
}

impl KeyRange {
    pub fn new(minimum: u64, maximum: u64) -> Result<Self, ConfigError> {
        if minimum > maximum {
            return Err(ConfigError::InvertedKeyRange { minimum, maximum });
        }
        Ok(Self { minimum, maximum })
    }

    pub fn minimum(&self) -> u64 {
        self.minimum
    }

    pub fn maximum(&self) -> u64 {
        self.maximum
    }

    /// Number of keys in the range (`[0, u64::MAX]` holds 2^64 keys, hence u128)
    pub fn span(&self) -> u128 {
        (self.maximum - self.minimum) as u128 + 1
    }

    pub fn contains(&self, key: u64) -> bool {
        (self.minimum..=self.maximum).contains(&key)
    }

    /// Contiguous partition `index` of `total`
    ///
    /// The first `span % total` partitions get one extra key. Every partition is non-empty, so
    /// `span >= total` is required.
    pub fn partition(&self, index: usize, total: usize) -> Result<KeyRange, ConfigError> {
        let span = self.span();
        let total_u = total as u128;
        if total == 0 || span < total_u {
            return Err(ConfigError::ParallelRangeTooSmall {
                range_len: u64::try_from(span).unwrap_or(u64::MAX),
                clients: total,
            });
        }

        let index_u = index as u128;
        let base = span / total_u;
        let extra = span % total_u;
        let start = self.minimum as u128 + index_u * base + index_u.min(extra);
        let len = base + u128::from(index_u < extra);

        Ok(KeyRange { minimum: start as u64, maximum: (start + len - 1) as u64 })
    }
}

/// Key distribution for one key slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum KeyPattern {
    /// min, min+1, ..., max, min, ... per connection
    Sequential,
    /// Uniform over the range
    Random,
    /// Normal distribution around `median`, clamped into the range
    Gaussian {
        /// Standard deviation (default: range width / 6)
        #[serde(default)]
        stddev: Option<f64>,
        /// Center of the distribution (default: range midpoint)
        #[serde(default)]
        median: Option<f64>,
    },
    /// Sequential inside a per-client disjoint partition of the range
    Parallel,
    /// Rank `k` drawn with probability proportional to `1/k^exponent`, key = minimum + k - 1
    Zipfian { exponent: f64 },
}

impl Default for KeyPattern {
    fn default() -> Self {
        KeyPattern::Random
    }
}

impl KeyPattern {
    pub fn name(&self) -> &'static str {
        match self {
            KeyPattern::Sequential => "sequential",
            KeyPattern::Random => "random",
            KeyPattern::Gaussian { .. } => "gaussian",
            KeyPattern::Parallel => "parallel",
            KeyPattern::Zipfian { .. } => "zipfian",
        }
    }

    /// Check the pattern against the range and client count before any generator is built
    pub fn validate(&self, range: &KeyRange, total_clients: usize) -> Result<(), ConfigError> {
        match self {
            KeyPattern::Sequential | KeyPattern::Random => Ok(()),
            KeyPattern::Parallel => range.partition(0, total_clients).map(|_| ()),
            KeyPattern::Zipfian { exponent } => {
                if !exponent.is_finite() || *exponent < 0.0 {
                    return Err(ConfigError::InvalidZipfExponent(*exponent));
                }
                Ok(())
            }
            KeyPattern::Gaussian { stddev, median } => {
                if let Some(stddev) = stddev {
                    if !stddev.is_finite() || *stddev <= 0.0 {
                        return Err(ConfigError::InvalidGaussian(format!(
                            "stddev must be a positive finite value, got {stddev}"
                        )));
                    }
                }
                if let Some(median) = median {
                    let (lo, hi) = (range.minimum as f64, range.maximum as f64);
                    if !median.is_finite() || *median < lo || *median > hi {
                        return Err(ConfigError::InvalidGaussian(format!(
                            "median {median} is outside the key range [{lo}, {hi}]"
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

/// Position of a client among all concurrent clients of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientPosition {
    pub index: usize,
    pub total: usize,
}

impl ClientPosition {
    pub fn new(index: usize, total: usize) -> Self {
        Self { index, total }
    }
}

#[derive(Debug)]
enum KeyState {
    Sequential { next: u64 },
    Random,
    Gaussian(Option<NormalDistribution>),
    Zipfian(ZipfianDistribution),
}

/// Key generator bound to one key slot of one connection
#[derive(Debug)]
pub struct KeyGenerator {
    /// Range keys are drawn from (the client's partition for Parallel)
    range: KeyRange,
    state: KeyState,
    stream: Arc<RandomStream>,
}

impl KeyGenerator {
    /// Build a generator for `client`
    ///
    /// `stream` is shared by every connection using this key slot.
    pub fn new(
        pattern: &KeyPattern,
        range: KeyRange,
        client: ClientPosition,
        stream: Arc<RandomStream>,
    ) -> Result<Self, ConfigError> {
        pattern.validate(&range, client.total)?;

        let (range, state) = match pattern {
            KeyPattern::Sequential => (range, KeyState::Sequential { next: range.minimum }),
            KeyPattern::Parallel => {
                let own = range.partition(client.index, client.total)?;
                (own, KeyState::Sequential { next: own.minimum })
            }
            KeyPattern::Random => (range, KeyState::Random),
            KeyPattern::Gaussian { stddev, median } => {
                let width = (range.maximum - range.minimum) as f64;
                let stddev = stddev.unwrap_or(width / 6.0);
                let median = median.unwrap_or(range.minimum as f64 + width / 2.0);
                // A single-key range has no spread
                let dist = if stddev > 0.0 {
                    Some(
                        NormalDistribution::new(median, stddev)
                            .map_err(|e| ConfigError::InvalidGaussian(e.to_string()))?,
                    )
                } else {
                    None
                };
                (range, KeyState::Gaussian(dist))
            }
            KeyPattern::Zipfian { exponent } => {
                let n = u64::try_from(range.span()).unwrap_or(u64::MAX);
                let dist = ZipfianDistribution::new(n, *exponent)
                    .map_err(|_| ConfigError::InvalidZipfExponent(*exponent))?;
                (range, KeyState::Zipfian(dist))
            }
        };

        Ok(Self { range, state, stream })
    }

    /// Next key, always inside [`KeyGenerator::range`]
    pub fn next_key(&mut self) -> u64 {
        let range = self.range;
        match &mut self.state {
            KeyState::Sequential { next } => {
                let key = *next;
                *next = if key == range.maximum { range.minimum } else { key + 1 };
                key
            }
            KeyState::Random => {
                self.stream.draw(|rng| rng.random_range(range.minimum..=range.maximum))
            }
            KeyState::Gaussian(None) => range.minimum,
            KeyState::Gaussian(Some(dist)) => self.stream.draw(|rng| {
                let (lo, hi) = (range.minimum as f64, range.maximum as f64);
                let mut sample = dist.sample(rng).round();
                for _ in 0..GAUSSIAN_MAX_REDRAWS {
                    if (lo..=hi).contains(&sample) {
                        break;
                    }
                    sample = dist.sample(rng).round();
                }
                // `as` saturates, the clamp keeps u64 rounding inside the range
                (sample.clamp(lo, hi) as u64).clamp(range.minimum, range.maximum)
            }),
            KeyState::Zipfian(dist) => {
                let rank = self.stream.draw(|rng| dist.sample_rank(rng));
                range.minimum + (rank - 1)
            }
        }
    }

    /// Restart a Sequential/Parallel cursor at the start of its range
    ///
    /// Stream-backed patterns are not restartable: their position belongs to the shared stream.
    pub fn reset(&mut self) {
        if let KeyState::Sequential { next } = &mut self.state {
            *next = self.range.minimum;
        }
    }

    /// Effective range of this generator
    pub fn range(&self) -> KeyRange {
        self.range
    }
}
