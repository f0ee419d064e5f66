//! Statistical distributions for key generation
//!
//! Distributions here do not own a random number generator. Every sample is
//! drawn from a caller-supplied [`Rng`], which lets the engine feed them from
//! a shared deterministic stream instead of a per-thread generator.
//!
//! - Zipfian for hot-key workloads
//! - Normal for bell-curve access around a median key

use rand::Rng;
use rand_distr::{Distribution, Normal, Zipf};

/// Zipfian distribution (power law, hot-key pattern)
///
/// The probability of drawing rank `k` (1-based) is proportional to
/// `1 / k^s`. With exponent s:
/// - s = 0.0: Uniform distribution
/// - s = 0.99: Typical database workload (YCSB default)
/// - s = 1.0: Classic Zipf (frequency proportional to 1/rank)
/// - s > 1.0: More skewed toward low-rank items
#[derive(Debug, Clone)]
pub struct ZipfianDistribution {
    /// Number of ranks (range: 1..=n)
    n: u64,
    /// Exponent: higher = more skewed
    s: f64,
    dist: Zipf<f64>,
}

impl ZipfianDistribution {
    /// Create a Zipfian distribution over ranks `1..=n`
    pub fn new(n: u64, s: f64) -> anyhow::Result<Self> {
        if n == 0 {
            anyhow::bail!("Zipfian n must be > 0");
        }
        if !s.is_finite() || s < 0.0 {
            anyhow::bail!("Zipfian exponent must be a finite value >= 0.0, got {}", s);
        }

        let dist = Zipf::new(n as f64, s)?;
        Ok(Self { n, s, dist })
    }

    /// Draw a 1-based rank in `1..=n`
    pub fn sample_rank<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        let rank = self.dist.sample(rng) as u64;
        rank.clamp(1, self.n)
    }

    /// Get the number of ranks
    pub fn n(&self) -> u64 {
        self.n
    }

    /// Get the exponent
    pub fn exponent(&self) -> f64 {
        self.s
    }
}

/// Normal (Gaussian) distribution
#[derive(Debug, Clone)]
pub struct NormalDistribution {
    mean: f64,
    std_dev: f64,
    dist: Normal<f64>,
}

impl NormalDistribution {
    pub fn new(mean: f64, std_dev: f64) -> anyhow::Result<Self> {
        if !mean.is_finite() {
            anyhow::bail!("Normal mean must be finite");
        }
        if !std_dev.is_finite() || std_dev <= 0.0 {
            anyhow::bail!("Normal std_dev must be > 0");
        }

        let dist = Normal::new(mean, std_dev)?;
        Ok(Self { mean, std_dev, dist })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.dist.sample(rng)
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }
}
