//! Random number capability and the deterministic default implementation.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use siphasher::sip::SipHasher13;
use std::hash::Hasher;

/// Capability every sampler draws its randomness from.
pub trait RandomSource {
    /// Re-seeds the generator, restarting its stream.
    fn set_seed(&mut self, seed: u32);

    /// Uniform draw from `[0, 1)`.
    fn random_double(&mut self) -> f64;

    /// Uniform integer from the inclusive range `[low, high]`.
    fn random_uint(&mut self, low: u32, high: u32) -> u32;

    /// Uniform index into a collection of `len` items. `len` must be positive.
    fn random_index(&mut self, len: usize) -> usize {
        let high = len.saturating_sub(1).min(u32::MAX as usize) as u32;
        self.random_uint(0, high) as usize
    }
}

/// Deterministic RNG handle used by every MCS simulation.
///
/// The handle wraps `StdRng` and remembers the seed it was created from so that
/// snapshots can record it. Substreams are derived by hashing
/// `(master_seed, substream_id)` with SipHash-1-3 under fixed zero keys, which is
/// stable across platforms.
#[derive(Debug, Clone)]
pub struct RngHandle {
    rng: StdRng,
    seed: u64,
}

impl RngHandle {
    /// Creates a new RNG handle from a master seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Creates an independent handle for the given substream of this handle's seed.
    pub fn substream(&self, substream: u64) -> Self {
        Self::from_seed(derive_substream_seed(self.seed, substream))
    }

    /// Seed the handle was last seeded with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns a mutable reference to the underlying RNG for advanced usage.
    pub fn inner_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

impl Default for RngHandle {
    fn default() -> Self {
        Self::from_seed(0)
    }
}

impl RandomSource for RngHandle {
    fn set_seed(&mut self, seed: u32) {
        *self = Self::from_seed(u64::from(seed));
    }

    fn random_double(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn random_uint(&mut self, low: u32, high: u32) -> u32 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..=high)
    }
}

impl RngCore for RngHandle {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

/// Derives the deterministic seed for a specific substream.
pub fn derive_substream_seed(master_seed: u64, substream: u64) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write_u64(master_seed);
    hasher.write_u64(substream);
    hasher.finish()
}
