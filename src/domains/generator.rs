//! Synthetic test statistics for the multiple-testing study.
//!
//! Each replication observes `X_i = mu_i + Z_i` with `Z_i ~ N(0, 1)`:
//!
//! ```text
//! mu_i = 0                      i <  m0   (true nulls)
//! mu_i ∈ {L/4, L/2, 3L/4, L}    i >= m0   (false nulls, sorted ascending)
//! ```
//!
//! # Variance Reduction
//!
//! The noise `Z` is drawn once per `(m, n_reps, seed)` as a
//! [`BaseNoiseMatrix`] and reused for every `m0` and distribution with the
//! same `m`; only the mean shift differs between configurations. The
//! per-call [`ReplicationSampler`] walks the same PCG stream in the same
//! row-major order, so both entry points agree bit for bit.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::{Distribution, SimulationConfig};
use crate::engine::rng::SimRng;
use crate::error::{SimError, SimResult};

/// Number of distinct non-zero effect levels.
pub const EFFECT_LEVELS: usize = 4;

/// Effect levels `L/4, L/2, 3L/4, L`, always in that order.
#[must_use]
pub fn effect_levels(signal_strength: f64) -> [f64; EFFECT_LEVELS] {
    [
        signal_strength / 4.0,
        signal_strength / 2.0,
        3.0 * signal_strength / 4.0,
        signal_strength,
    ]
}

/// How many false nulls land on each effect level.
///
/// `count_k = round(w_k / sum(w) * m1)` with ties rounded to even; the
/// residual `m1 - sum(count)` goes to the last level. If that would leave the
/// last level negative, the deficit is carried down to the preceding levels,
/// so the counts are non-negative and always sum to exactly `m1`.
#[must_use]
pub fn allocate_level_counts(m1: usize, distribution: Distribution) -> [usize; EFFECT_LEVELS] {
    let weights = distribution.weights();
    let total = f64::from(weights.iter().sum::<u32>());

    let mut counts = [0_i64; EFFECT_LEVELS];
    for (count, &weight) in counts.iter_mut().zip(&weights) {
        *count = (f64::from(weight) / total * m1 as f64).round_ties_even() as i64;
    }

    let residual = m1 as i64 - counts.iter().sum::<i64>();
    counts[EFFECT_LEVELS - 1] += residual;

    let mut carry = 0_i64;
    for count in counts.iter_mut().rev() {
        *count -= carry;
        carry = (-*count).max(0);
        *count = (*count).max(0);
    }

    counts.map(|c| c as usize)
}

/// Means of the `m1` false nulls, sorted ascending.
///
/// # Example
///
/// ```rust
/// use fdrsim::config::Distribution;
/// use fdrsim::domains::generator::generate_alternative_means;
///
/// let means = generate_alternative_means(10, 4.0, Distribution::Increasing);
/// assert_eq!(means, vec![1.0, 2.0, 2.0, 3.0, 3.0, 3.0, 4.0, 4.0, 4.0, 4.0]);
/// ```
#[must_use]
pub fn generate_alternative_means(
    m1: usize,
    signal_strength: f64,
    distribution: Distribution,
) -> Vec<f64> {
    if m1 == 0 {
        return Vec::new();
    }

    let levels = effect_levels(signal_strength);
    let counts = allocate_level_counts(m1, distribution);

    let mut means = Vec::with_capacity(m1);
    for (&level, &count) in levels.iter().zip(&counts) {
        means.extend(std::iter::repeat(level).take(count));
    }

    // Sorted so that hypothesis index maps to effect size identically
    // across distributions.
    means.sort_by(f64::total_cmp);
    means
}

/// Full length-`m` mean vector of one configuration.
///
/// Constant across replications: only the noise term varies row by row.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanVector {
    means: Vec<f64>,
    m0: usize,
}

impl MeanVector {
    /// Build the mean vector: `m0` zeros followed by the sorted alternative
    /// means.
    #[must_use]
    pub fn new(config: &SimulationConfig) -> Self {
        let mut means = vec![0.0; config.m0()];
        means.extend(generate_alternative_means(
            config.m1(),
            config.signal_strength(),
            config.distribution(),
        ));
        Self {
            means,
            m0: config.m0(),
        }
    }

    /// All `m` means.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.means
    }

    /// Means of the false nulls only.
    #[must_use]
    pub fn alternative_means(&self) -> &[f64] {
        &self.means[self.m0..]
    }

    /// Number of hypotheses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.means.len()
    }

    /// Whether the vector is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }

    /// True-null indicator: `index < m0`.
    #[must_use]
    pub fn true_nulls(&self) -> Vec<bool> {
        (0..self.means.len()).map(|i| i < self.m0).collect()
    }
}

/// `n_reps x m` matrix of independent standard normals.
///
/// Written once at generation, read-only afterwards: there are no mutable
/// accessors, so one matrix can be shared across threads and configurations
/// without locking.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseNoiseMatrix {
    rows: usize,
    cols: usize,
    seed: u64,
    data: Vec<f64>,
}

impl BaseNoiseMatrix {
    /// Draw a `rows x cols` matrix from `SimRng::new(seed)` in row-major
    /// order.
    #[must_use]
    pub fn generate(rows: usize, cols: usize, seed: u64) -> Self {
        let mut rng = SimRng::new(seed);
        let mut data = vec![0.0; rows * cols];
        rng.fill_standard_normal(&mut data);
        Self {
            rows,
            cols,
            seed,
            data,
        }
    }

    /// Wrap caller-supplied rows.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if the rows are ragged.
    pub fn from_rows(seed: u64, rows: Vec<Vec<f64>>) -> SimResult<Self> {
        let n_rows = rows.len();
        let cols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().find(|row| row.len() != cols) {
            return Err(SimError::ShapeMismatch {
                expected_rows: n_rows,
                expected_cols: cols,
                rows: n_rows,
                cols: bad.len(),
            });
        }
        Ok(Self {
            rows: n_rows,
            cols,
            seed,
            data: rows.into_iter().flatten().collect(),
        })
    }

    /// Number of rows (replications).
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (hypotheses).
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Seed the matrix was generated from.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Noise for replication `index`, or `None` past the last row.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.cols;
        self.data.get(start..start + self.cols)
    }

    /// Iterate over rows in replication order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact panics on a zero chunk size
        self.data.chunks_exact(self.cols.max(1)).take(self.rows)
    }

    /// Check that this matrix can drive `config`: `n_reps x m` and the same
    /// seed.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` or `SeedMismatch`.
    pub fn check_compatible(&self, config: &SimulationConfig) -> SimResult<()> {
        if self.rows != config.n_reps() || self.cols != config.m() {
            return Err(SimError::ShapeMismatch {
                expected_rows: config.n_reps(),
                expected_cols: config.m(),
                rows: self.rows,
                cols: self.cols,
            });
        }
        if self.seed != config.seed() {
            return Err(SimError::SeedMismatch {
                expected: config.seed(),
                found: self.seed,
            });
        }
        Ok(())
    }
}

/// Generate the shared noise matrix for `config`'s `(n_reps, m, seed)`.
#[must_use]
pub fn generate_base_data(config: &SimulationConfig) -> BaseNoiseMatrix {
    BaseNoiseMatrix::generate(config.n_reps(), config.m(), config.seed())
}

/// Per-call noise generator.
///
/// Yields the rows of [`generate_base_data`] one at a time without holding
/// the whole matrix.
#[derive(Debug, Clone)]
pub struct ReplicationSampler {
    rng: SimRng,
    m: usize,
}

impl ReplicationSampler {
    /// Create a sampler seeded from `config.seed()`.
    #[must_use]
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            rng: SimRng::new(config.seed()),
            m: config.m(),
        }
    }

    /// Fill `row` with the next replication's noise.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` unless `row.len() == m`.
    pub fn fill_next_row(&mut self, row: &mut [f64]) -> SimResult<()> {
        if row.len() != self.m {
            return Err(SimError::ShapeMismatch {
                expected_rows: 1,
                expected_cols: self.m,
                rows: 1,
                cols: row.len(),
            });
        }
        self.rng.fill_standard_normal(row);
        Ok(())
    }

    /// Draw the next replication's noise.
    pub fn next_row(&mut self) -> Vec<f64> {
        let mut row = vec![0.0; self.m];
        self.rng.fill_standard_normal(&mut row);
        row
    }
}

/// Test statistics of one replication: `means + noise_row`.
///
/// # Errors
///
/// Returns `ShapeMismatch` if the lengths differ.
pub fn compose_replication_statistic(means: &[f64], noise_row: &[f64]) -> SimResult<Vec<f64>> {
    if means.len() != noise_row.len() {
        return Err(SimError::ShapeMismatch {
            expected_rows: 1,
            expected_cols: means.len(),
            rows: 1,
            cols: noise_row.len(),
        });
    }
    Ok(means.iter().zip(noise_row).map(|(mu, z)| mu + z).collect())
}

/// Base noise matrices shared across configurations.
///
/// Owned by the orchestration layer and keyed by `(m, n_reps, seed)`; the
/// engine itself only ever receives a matrix by reference.
#[derive(Debug, Default)]
pub struct NoiseCache {
    matrices: HashMap<(usize, usize, u64), Arc<BaseNoiseMatrix>>,
}

impl NoiseCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Matrix for `config`, generated on first request.
    pub fn get_or_generate(&mut self, config: &SimulationConfig) -> Arc<BaseNoiseMatrix> {
        let key = (config.m(), config.n_reps(), config.seed());
        Arc::clone(self.matrices.entry(key).or_insert_with(|| {
            debug!(
                m = config.m(),
                n_reps = config.n_reps(),
                seed = config.seed(),
                "Generating base noise matrix"
            );
            Arc::new(generate_base_data(config))
        }))
    }

    /// Number of cached matrices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    /// Drop every cached matrix.
    pub fn clear(&mut self) {
        self.matrices.clear();
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn distribution() -> impl Strategy<Value = Distribution> {
        prop_oneof![
            Just(Distribution::Decreasing),
            Just(Distribution::Equal),
            Just(Distribution::Increasing),
        ]
    }

    proptest! {
        /// Counts always sum to m1 exactly.
        #[test]
        fn prop_counts_sum_to_m1(m1 in 0usize..500, d in distribution()) {
            let counts = allocate_level_counts(m1, d);
            prop_assert_eq!(counts.iter().sum::<usize>(), m1);
        }

        /// Means are sorted, of length m1, and drawn from the four levels.
        #[test]
        fn prop_means_sorted_and_on_levels(m1 in 0usize..200, l in 0.1f64..10.0, d in distribution()) {
            let means = generate_alternative_means(m1, l, d);
            let levels = effect_levels(l);
            prop_assert_eq!(means.len(), m1);
            prop_assert!(means.windows(2).all(|w| w[0] <= w[1]));
            prop_assert!(means.iter().all(|mu| levels.contains(mu)));
        }
    }
}
