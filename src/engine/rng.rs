//! Deterministic random number generation.
//!
//! PCG64 (`rand_pcg::Pcg64`) seeded through `SeedableRng::seed_from_u64`.
//! The master seed is the only entropy source.
//!
//! # Reproducibility Guarantee
//!
//! Given the same master seed, every uniform and normal sequence is
//! bitwise-identical across runs and platforms. Both noise entry points
//! (the shared base matrix and the per-replication sampler) draw from a
//! `SimRng` built this way, in the same row-major order.

use rand::prelude::*;
use rand_pcg::Pcg64;

/// Deterministic, reproducible random number generator.
#[derive(Debug, Clone)]
pub struct SimRng {
    /// Master seed for reproducibility.
    master_seed: u64,
    /// Internal PCG state.
    rng: Pcg64,
}

impl SimRng {
    /// Create a new RNG with the given master seed.
    #[must_use]
    pub fn new(master_seed: u64) -> Self {
        Self {
            master_seed,
            rng: Pcg64::seed_from_u64(master_seed),
        }
    }

    /// Get the master seed.
    #[must_use]
    pub const fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Generate a random f64 in [0, 1).
    pub fn gen_f64(&mut self) -> f64 {
        self.rng.gen()
    }

    /// Generate a standard normal sample using the Box-Muller transform.
    ///
    /// Consumes exactly two uniforms per sample (cosine branch only), so the
    /// stream position after `n` samples is always `2n` uniforms.
    pub fn gen_standard_normal(&mut self) -> f64 {
        let u1 = self.gen_f64();
        let u2 = self.gen_f64();

        // Avoid log(0)
        let u1 = if u1 < f64::EPSILON { f64::EPSILON } else { u1 };

        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Fill `out` with standard normal samples, in order.
    pub fn fill_standard_normal(&mut self, out: &mut [f64]) {
        for slot in out.iter_mut() {
            *slot = self.gen_standard_normal();
        }
    }
}
