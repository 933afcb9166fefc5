//! Deterministic random number generation.
//!
//! A run owns one master seed; each consumer gets its own ChaCha stream
//! derived from `(seed, stream name)`, so adding a consumer never shifts the
//! draws another one sees.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RngManager {
    master_seed: u64,
}

impl RngManager {
    pub fn new(seed: u64) -> Self {
        Self { master_seed: seed }
    }

    /// Picks a fresh master seed. Log [`RngManager::seed`] to replay the run.
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    pub fn seed(&self) -> u64 {
        self.master_seed
    }

    /// Independent generator for the named consumer.
    pub fn stream(&self, name: &str) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.derive_seed(name))
    }

    fn derive_seed(&self, name: &str) -> u64 {
        let mut seed = self
            .master_seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        for byte in name.bytes() {
            seed ^= (byte as u64).wrapping_mul(1103515245);
            seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
        }
        seed
    }
}

/// Uniform draws used by the disaster roll.
pub trait RngExt {
    /// Uniform value in `[0, 1)`.
    fn unit(&mut self) -> f64;
    /// True with the given probability.
    fn chance(&mut self, probability: f64) -> bool;
}

impl<R: Rng> RngExt for R {
    fn unit(&mut self) -> f64 {
        self.gen::<f64>()
    }

    fn chance(&mut self, probability: f64) -> bool {
        self.unit() < probability
    }
}
