//! Reproducible randomness
//!
//! Every pseudo-random decision the engine makes (command draw, Random/Gaussian/Zipfian keys,
//! random replay selection, payload sizes) comes from a [`RandomStream`] whose seed is derived
//! from one master seed with SHA-256:
//! - Deterministic: same master + component = same derived seed
//! - Independent: different components get unrelated seeds
//!
//! A stream may be shared by all connections on all threads. Each draw claims the next ticket
//! from an atomic counter and seeds a fresh generator from `(seed, ticket)`, so a draw is a pure
//! function of its ticket. Threads may interleave differently between runs, but the multiset of
//! values drawn by `N` requests is always the same.
//!
//! Command selection uses one stream per connection, addressed by request slot with
//! [`RandomStream::draw_at`], so each connection issues the same commands on every run.
//!
//! # Example
//!
//! ```
//! use phloem_core::seed::{derive_seed, RandomStream};
//! use rand::Rng;
//!
//! assert_eq!(derive_seed(42, "test"), derive_seed(42, "test"));
//! assert_ne!(derive_seed(42, "comp1"), derive_seed(42, "comp2"));
//!
//! let a = RandomStream::new(derive_seed(42, "keys"));
//! let b = RandomStream::new(derive_seed(42, "keys"));
//! assert_eq!(a.draw(|rng| rng.random::<u64>()), b.draw(|rng| rng.random::<u64>()));
//! ```

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

/// Master seed used when neither an explicit seed nor `randomize` is configured
pub const DEFAULT_SEED: u64 = 5381;

/// Derive a component-specific seed from a master seed using SHA-256
///
/// # Parameters
/// - `master_seed`: The master seed (from the profile's `experiment.seed`)
/// - `component`: Component identifier (see [`components`])
pub fn derive_seed(master_seed: u64, component: &str) -> u64 {
    let mut hasher = Sha256::new();

    // Big-endian so the derivation is platform independent
    hasher.update(master_seed.to_be_bytes());
    hasher.update(component.as_bytes());

    let result = hasher.finalize();

    u64::from_be_bytes([
        result[0], result[1], result[2], result[3], result[4], result[5], result[6], result[7],
    ])
}

/// Resolve the master seed for a run
///
/// `randomize` draws a fresh seed from OS entropy; otherwise the explicit seed is used, falling
/// back to [`DEFAULT_SEED`].
pub fn master_seed(explicit: Option<u64>, randomize: bool) -> u64 {
    if randomize {
        SmallRng::from_os_rng().random()
    } else {
        explicit.unwrap_or(DEFAULT_SEED)
    }
}

/// Standard component names for seed derivation
pub mod components {
    pub const COMMAND_SELECTION: &str = "command_selection";
    pub const REPLAY_RANDOM: &str = "replay_random_selection";
    pub const PAYLOAD: &str = "payload_generation";
    pub const KEY_SLOT: &str = "key_slot";

    /// Component name for the key generator of command template `index`
    pub fn key_slot(index: usize) -> String {
        format!("{KEY_SLOT}/{index}")
    }

    /// Component name for the command draws of connection `conn`
    pub fn command_selection(conn: usize) -> String {
        format!("{COMMAND_SELECTION}/{conn}")
    }
}

/// Shared, atomically advanced random stream
#[derive(Debug)]
pub struct RandomStream {
    seed: u64,
    ticket: AtomicU64,
}

impl RandomStream {
    pub fn new(seed: u64) -> Self {
        Self { seed, ticket: AtomicU64::new(0) }
    }

    /// Stream for `component` derived from `master_seed`
    pub fn for_component(master_seed: u64, component: &str) -> Self {
        Self::new(derive_seed(master_seed, component))
    }

    /// Claim the next ticket and run `f` with a generator seeded from it
    pub fn draw<T>(&self, f: impl FnOnce(&mut SmallRng) -> T) -> T {
        let ticket = self.ticket.fetch_add(1, Ordering::Relaxed);
        self.draw_at(ticket, f)
    }

    /// Run `f` with the generator for `ticket`, leaving the shared counter alone
    pub fn draw_at<T>(&self, ticket: u64, f: impl FnOnce(&mut SmallRng) -> T) -> T {
        let mut rng = SmallRng::seed_from_u64(mix(self.seed, ticket));
        f(&mut rng)
    }

    /// Number of draws taken so far
    pub fn draws(&self) -> u64 {
        self.ticket.load(Ordering::Relaxed)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// SplitMix64 finalizer over `seed` and `ticket`
fn mix(seed: u64, ticket: u64) -> u64 {
    let mut z = seed ^ ticket.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_derive_seed_deterministic() {
        assert_eq!(derive_seed(42, "test_component"), derive_seed(42, "test_component"));
    }

    #[test]
    fn test_derive_seed_different_components() {
        let master = 12345;
        assert_ne!(derive_seed(master, "component_a"), derive_seed(master, "component_b"));
    }

    #[test]
    fn test_derive_seed_different_masters() {
        assert_ne!(derive_seed(100, "test"), derive_seed(200, "test"));
    }

    #[test]
    fn test_component_constants() {
        use components::*;

        let master = 42;
        let seeds = [
            derive_seed(master, COMMAND_SELECTION),
            derive_seed(master, REPLAY_RANDOM),
            derive_seed(master, PAYLOAD),
            derive_seed(master, &key_slot(0)),
            derive_seed(master, &key_slot(1)),
            derive_seed(master, &command_selection(0)),
            derive_seed(master, &command_selection(1)),
        ];

        for i in 0..seeds.len() {
            for j in (i + 1)..seeds.len() {
                assert_ne!(seeds[i], seeds[j], "Seeds {} and {} are not unique", i, j);
            }
        }
    }

    #[test]
    fn test_master_seed_defaults_to_constant() {
        assert_eq!(master_seed(None, false), DEFAULT_SEED);
        assert_eq!(master_seed(Some(7), false), 7);
    }

    #[test]
    fn test_stream_same_seed_same_sequence() {
        let a = RandomStream::new(99);
        let b = RandomStream::new(99);
        let xs: Vec<u64> = (0..50).map(|_| a.draw(|rng| rng.random())).collect();
        let ys: Vec<u64> = (0..50).map(|_| b.draw(|rng| rng.random())).collect();
        assert_eq!(xs, ys);
        assert_eq!(a.draws(), 50);
    }

    #[test]
    fn test_draw_at_matches_ticket_order() {
        let stream = RandomStream::new(17);
        let addressed: Vec<u64> = (0..20).map(|t| stream.draw_at(t, |rng| rng.random())).collect();
        assert_eq!(stream.draws(), 0);

        let claimed: Vec<u64> = (0..20).map(|_| stream.draw(|rng| rng.random())).collect();
        assert_eq!(addressed, claimed);
    }

    #[test]
    fn test_stream_draws_differ_between_tickets() {
        let stream = RandomStream::new(1);
        let values: HashSet<u64> = (0..1000).map(|_| stream.draw(|rng| rng.random())).collect();
        assert_eq!(values.len(), 1000);
    }

    #[test]
    fn test_stream_multiset_independent_of_threads() {
        let sequential = RandomStream::new(2024);
        let mut expected: Vec<u32> =
            (0..400).map(|_| sequential.draw(|rng| rng.random_range(0..1_000_000))).collect();
        expected.sort_unstable();

        let shared = Arc::new(RandomStream::new(2024));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stream = shared.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| stream.draw(|rng| rng.random_range(0..1_000_000)))
                        .collect::<Vec<u32>>()
                })
            })
            .collect();

        let mut actual: Vec<u32> =
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        actual.sort_unstable();

        assert_eq!(expected, actual);
    }
}
