//! Core simulation engine.
//!
//! One `SimulationEngine` runs one configuration:
//!
//! ```text
//! Initialize(config) -> [noise: sampler | shared base matrix]
//!   -> for r in 0..n_reps:
//!        statistic = means + noise[r]
//!        p         = two-sided p-values
//!        Bonferroni / Hochberg / BH on the same p
//!        power, FDR, FWER per procedure
//!   -> SimulationResult
//! ```
//!
//! The mean vector is fixed per configuration; only the noise changes
//! between replications. Supplying the same base matrix to several
//! configurations with equal `m` is the variance-reduction path: their
//! differences then reflect the configurations, not the noise draw.

pub mod parallel;
pub mod rng;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use parallel::{ReplicationTask, WorkStealingRunner};
pub use rng::SimRng;

use crate::config::{ResultKey, SimulationConfig};
use crate::domains::generator::{
    compose_replication_statistic, BaseNoiseMatrix, MeanVector, ReplicationSampler,
};
use crate::domains::metrics::RejectionCounts;
use crate::domains::procedures::{compute_pvalues, Procedure};
use crate::error::{SimError, SimResult};

/// Metrics of one replication for all three procedures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplicationRecord {
    /// Bonferroni power (NaN when `m1 == 0`).
    pub power_bonf: f64,
    /// Hochberg power.
    pub power_hoch: f64,
    /// BH power.
    pub power_bh: f64,
    /// Bonferroni false discovery proportion.
    pub fdr_bonf: f64,
    /// Hochberg false discovery proportion.
    pub fdr_hoch: f64,
    /// BH false discovery proportion.
    pub fdr_bh: f64,
    /// Bonferroni family-wise error indicator.
    pub fwer_bonf: f64,
    /// Hochberg family-wise error indicator.
    pub fwer_hoch: f64,
    /// BH family-wise error indicator.
    pub fwer_bh: f64,
}

impl ReplicationRecord {
    fn record(&mut self, procedure: Procedure, counts: RejectionCounts) {
        let (power, fdr, fwer) = (counts.power(), counts.fdr(), counts.fwer());
        match procedure {
            Procedure::Bonferroni => {
                self.power_bonf = power;
                self.fdr_bonf = fdr;
                self.fwer_bonf = fwer;
            }
            Procedure::Hochberg => {
                self.power_hoch = power;
                self.fdr_hoch = fdr;
                self.fwer_hoch = fwer;
            }
            Procedure::BenjaminiHochberg => {
                self.power_bh = power;
                self.fdr_bh = fdr;
                self.fwer_bh = fwer;
            }
        }
    }
}

/// Progress of a running simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationProgress {
    /// Replications finished so far.
    pub completed: usize,
    /// Replications in the run.
    pub total: usize,
}

/// Per-replication metric arrays of one configuration.
///
/// Every array has length `n_reps` and is indexed by replication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Configuration that produced the arrays.
    pub config: SimulationConfig,
    /// Bonferroni power per replication.
    pub power_bonf: Vec<f64>,
    /// Hochberg power per replication.
    pub power_hoch: Vec<f64>,
    /// BH power per replication.
    pub power_bh: Vec<f64>,
    /// Bonferroni FDR per replication.
    pub fdr_bonf: Vec<f64>,
    /// Hochberg FDR per replication.
    pub fdr_hoch: Vec<f64>,
    /// BH FDR per replication.
    pub fdr_bh: Vec<f64>,
    /// Bonferroni FWER indicator per replication.
    pub fwer_bonf: Vec<f64>,
    /// Hochberg FWER indicator per replication.
    pub fwer_hoch: Vec<f64>,
    /// BH FWER indicator per replication.
    pub fwer_bh: Vec<f64>,
}

impl SimulationResult {
    fn with_capacity(config: SimulationConfig) -> Self {
        let n = config.n_reps();
        Self {
            config,
            power_bonf: Vec::with_capacity(n),
            power_hoch: Vec::with_capacity(n),
            power_bh: Vec::with_capacity(n),
            fdr_bonf: Vec::with_capacity(n),
            fdr_hoch: Vec::with_capacity(n),
            fdr_bh: Vec::with_capacity(n),
            fwer_bonf: Vec::with_capacity(n),
            fwer_hoch: Vec::with_capacity(n),
            fwer_bh: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, record: &ReplicationRecord) {
        self.power_bonf.push(record.power_bonf);
        self.power_hoch.push(record.power_hoch);
        self.power_bh.push(record.power_bh);
        self.fdr_bonf.push(record.fdr_bonf);
        self.fdr_hoch.push(record.fdr_hoch);
        self.fdr_bh.push(record.fdr_bh);
        self.fwer_bonf.push(record.fwer_bonf);
        self.fwer_hoch.push(record.fwer_hoch);
        self.fwer_bh.push(record.fwer_bh);
    }

    /// Key of the configuration.
    #[must_use]
    pub const fn key(&self) -> ResultKey {
        self.config.key()
    }

    /// Number of replications stored.
    #[must_use]
    pub fn n_reps(&self) -> usize {
        self.power_bonf.len()
    }

    /// Power array of `procedure`.
    #[must_use]
    pub fn power(&self, procedure: Procedure) -> &[f64] {
        match procedure {
            Procedure::Bonferroni => &self.power_bonf,
            Procedure::Hochberg => &self.power_hoch,
            Procedure::BenjaminiHochberg => &self.power_bh,
        }
    }

    /// FDR array of `procedure`.
    #[must_use]
    pub fn fdr(&self, procedure: Procedure) -> &[f64] {
        match procedure {
            Procedure::Bonferroni => &self.fdr_bonf,
            Procedure::Hochberg => &self.fdr_hoch,
            Procedure::BenjaminiHochberg => &self.fdr_bh,
        }
    }

    /// FWER indicator array of `procedure`.
    #[must_use]
    pub fn fwer(&self, procedure: Procedure) -> &[f64] {
        match procedure {
            Procedure::Bonferroni => &self.fwer_bonf,
            Procedure::Hochberg => &self.fwer_hoch,
            Procedure::BenjaminiHochberg => &self.fwer_bh,
        }
    }

    fn arrays(&self) -> [&[f64]; 9] {
        [
            &self.power_bonf,
            &self.power_hoch,
            &self.power_bh,
            &self.fdr_bonf,
            &self.fdr_hoch,
            &self.fdr_bh,
            &self.fwer_bonf,
            &self.fwer_hoch,
            &self.fwer_bh,
        ]
    }

    /// Bit-for-bit equality, treating NaN entries with equal bits as equal.
    #[must_use]
    pub fn bitwise_eq(&self, other: &Self) -> bool {
        let same_bits = |a: &[f64], b: &[f64]| {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
        };
        self.config == other.config
            && self
                .arrays()
                .iter()
                .zip(other.arrays().iter())
                .all(|(a, b)| same_bits(a, b))
    }
}

/// Runs the replication loop of one configuration.
#[derive(Debug, Clone)]
pub struct SimulationEngine {
    config: SimulationConfig,
    means: MeanVector,
    true_nulls: Vec<bool>,
}

impl SimulationEngine {
    /// Create an engine and precompute the mean vector.
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        let means = MeanVector::new(&config);
        let true_nulls = means.true_nulls();
        Self {
            config,
            means,
            true_nulls,
        }
    }

    /// Configuration being simulated.
    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Mean vector shared by every replication.
    #[must_use]
    pub const fn means(&self) -> &MeanVector {
        &self.means
    }

    /// True-null indicator.
    #[must_use]
    pub fn true_nulls(&self) -> &[bool] {
        &self.true_nulls
    }

    /// Run with ad-hoc noise drawn from the configuration's seed.
    ///
    /// # Errors
    ///
    /// Only fails if the engine's internal shapes disagree.
    pub fn run(&self) -> SimResult<SimulationResult> {
        self.run_with_progress(None, &mut |_| {})
    }

    /// Run against a shared base noise matrix.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` or `SeedMismatch` before any replication runs
    /// if `base` does not fit the configuration.
    pub fn run_with_base_data(&self, base: &BaseNoiseMatrix) -> SimResult<SimulationResult> {
        self.run_with_progress(Some(base), &mut |_| {})
    }

    /// Run, calling `progress` once after every completed replication.
    ///
    /// # Errors
    ///
    /// See [`Self::run_with_base_data`].
    pub fn run_with_progress(
        &self,
        base: Option<&BaseNoiseMatrix>,
        progress: &mut dyn FnMut(ReplicationProgress),
    ) -> SimResult<SimulationResult> {
        if let Some(base) = base {
            base.check_compatible(&self.config)?;
        }

        let key = self.config.key();
        let total = self.config.n_reps();
        debug!(%key, n_reps = total, shared_noise = base.is_some(), "Simulation started");

        let mut result = SimulationResult::with_capacity(self.config.clone());
        match base {
            Some(base) => {
                for (index, row) in base.iter_rows().enumerate() {
                    result.push(&self.run_replication(row)?);
                    progress(ReplicationProgress {
                        completed: index + 1,
                        total,
                    });
                }
            }
            None => {
                let mut sampler = ReplicationSampler::new(&self.config);
                let mut row = vec![0.0; self.config.m()];
                for index in 0..total {
                    sampler.fill_next_row(&mut row)?;
                    result.push(&self.run_replication(&row)?);
                    progress(ReplicationProgress {
                        completed: index + 1,
                        total,
                    });
                }
            }
        }

        debug!(%key, "Simulation finished");
        Ok(result)
    }

    /// Run against `base` on `workers` threads.
    ///
    /// The output is bit-identical to [`Self::run_with_base_data`].
    ///
    /// # Errors
    ///
    /// See [`Self::run_with_base_data`].
    pub fn run_parallel(&self, base: &BaseNoiseMatrix, workers: usize) -> SimResult<SimulationResult> {
        self.run_parallel_with_progress(base, workers, &mut |_| {})
    }

    /// [`Self::run_parallel`] with a callback after every finished
    /// replication.
    ///
    /// The callback runs on the calling thread. `completed` counts finished
    /// replications in completion order, which need not be index order.
    ///
    /// # Errors
    ///
    /// See [`Self::run_with_base_data`].
    pub fn run_parallel_with_progress(
        &self,
        base: &BaseNoiseMatrix,
        workers: usize,
        progress: &mut dyn FnMut(ReplicationProgress),
    ) -> SimResult<SimulationResult> {
        base.check_compatible(&self.config)?;

        let key = self.config.key();
        let total = self.config.n_reps();
        let runner = WorkStealingRunner::with_workers(workers);
        debug!(%key, workers = runner.num_workers(), "Parallel simulation started");

        let records = runner.execute_with_progress(
            total,
            |task| {
                let row = base.row(task.index).ok_or_else(|| SimError::ShapeMismatch {
                    expected_rows: self.config.n_reps(),
                    expected_cols: self.config.m(),
                    rows: base.rows(),
                    cols: base.cols(),
                })?;
                self.run_replication(row)
            },
            &mut |completed| progress(ReplicationProgress { completed, total }),
        );

        let mut result = SimulationResult::with_capacity(self.config.clone());
        for record in records {
            result.push(&record?);
        }

        debug!(%key, "Parallel simulation finished");
        Ok(result)
    }

    /// Evaluate one replication from its noise row.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` unless `noise_row.len() == m`.
    pub fn run_replication(&self, noise_row: &[f64]) -> SimResult<ReplicationRecord> {
        let statistics = compose_replication_statistic(self.means.as_slice(), noise_row)?;
        let pvalues = compute_pvalues(&statistics);
        let alpha = self.config.alpha();

        let mut record = ReplicationRecord::default();
        for procedure in Procedure::ALL {
            let rejections = procedure.apply(&pvalues, alpha);
            record.record(procedure, RejectionCounts::tally(&rejections, &self.true_nulls));
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Distribution;
    use crate::domains::generator::generate_base_data;

    fn config(m: usize, m0: usize, distribution: Distribution, n_reps: usize) -> SimulationConfig {
        SimulationConfig::builder()
            .m(m)
            .m0(m0)
            .distribution(distribution)
            .n_reps(n_reps)
            .build()
            .unwrap()
    }

    #[test]
    fn test_result_arrays_have_n_reps_entries() {
        let engine = SimulationEngine::new(config(8, 4, Distribution::Equal, 50));
        let result = engine.run().unwrap();
        assert_eq!(result.n_reps(), 50);
        for procedure in Procedure::ALL {
            assert_eq!(result.power(procedure).len(), 50);
            assert_eq!(result.fdr(procedure).len(), 50);
            assert_eq!(result.fwer(procedure).len(), 50);
        }
        assert_eq!(result.key(), engine.config().key());
    }

    #[test]
    fn test_reproducible() {
        let engine = SimulationEngine::new(config(16, 8, Distribution::Decreasing, 100));
        let a = engine.run().unwrap();
        let b = engine.run().unwrap();
        assert!(a.bitwise_eq(&b));
    }

    #[test]
    fn test_sampler_matches_base_data() {
        let cfg = config(8, 2, Distribution::Increasing, 64);
        let engine = SimulationEngine::new(cfg.clone());
        let base = generate_base_data(&cfg);
        let adhoc = engine.run().unwrap();
        let shared = engine.run_with_base_data(&base).unwrap();
        assert!(adhoc.bitwise_eq(&shared));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let cfg = config(16, 4, Distribution::Equal, 200);
        let engine = SimulationEngine::new(cfg.clone());
        let base = generate_base_data(&cfg);
        let sequential = engine.run_with_base_data(&base).unwrap();
        for workers in [1, 3, 8] {
            let parallel = engine.run_parallel(&base, workers).unwrap();
            assert!(sequential.bitwise_eq(&parallel), "workers = {workers}");
        }
    }

    #[test]
    fn test_all_null_power_is_nan() {
        let engine = SimulationEngine::new(config(4, 4, Distribution::Equal, 20));
        let result = engine.run().unwrap();
        for procedure in Procedure::ALL {
            assert!(result.power(procedure).iter().all(|p| p.is_nan()));
            assert!(result.fdr(procedure).iter().all(|f| *f == 0.0 || *f == 1.0));
        }
    }

    #[test]
    fn test_no_nulls_has_no_false_discoveries() {
        let engine = SimulationEngine::new(config(8, 0, Distribution::Equal, 30));
        let result = engine.run().unwrap();
        for procedure in Procedure::ALL {
            assert!(result.fdr(procedure).iter().all(|&f| f == 0.0));
            assert!(result.fwer(procedure).iter().all(|&f| f == 0.0));
            assert!(result.power(procedure).iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }

    #[test]
    fn test_step_up_power_dominates_bonferroni() {
        let engine = SimulationEngine::new(config(32, 16, Distribution::Decreasing, 100));
        let result = engine.run().unwrap();
        for r in 0..result.n_reps() {
            assert!(result.power_hoch[r] >= result.power_bonf[r]);
            assert!(result.power_bh[r] >= result.power_hoch[r]);
        }
    }

    #[test]
    fn test_shape_mismatch_fails_before_running() {
        let cfg = config(8, 4, Distribution::Equal, 10);
        let engine = SimulationEngine::new(cfg);
        let wrong = BaseNoiseMatrix::generate(10, 7, 12_345);
        let mut calls = 0;
        let err = engine
            .run_with_progress(Some(&wrong), &mut |_| calls += 1)
            .unwrap_err();
        assert!(matches!(err, SimError::ShapeMismatch { .. }));
        assert_eq!(calls, 0);
        assert!(engine.run_parallel(&wrong, 2).is_err());
    }

    #[test]
    fn test_seed_mismatch() {
        let cfg = config(8, 4, Distribution::Equal, 10);
        let engine = SimulationEngine::new(cfg);
        let other = BaseNoiseMatrix::generate(10, 8, 1);
        let err = engine.run_with_base_data(&other).unwrap_err();
        assert!(matches!(err, SimError::SeedMismatch { expected: 12_345, found: 1 }));
    }

    #[test]
    fn test_progress_callback_once_per_replication() {
        let engine = SimulationEngine::new(config(4, 2, Distribution::Equal, 25));
        let mut seen = Vec::new();
        engine
            .run_with_progress(None, &mut |p| seen.push(p.completed))
            .unwrap();
        assert_eq!(seen, (1..=25).collect::<Vec<_>>());
    }

    #[test]
    fn test_parallel_progress_once_per_replication() {
        let cfg = config(8, 4, Distribution::Increasing, 40);
        let base = generate_base_data(&cfg);
        let engine = SimulationEngine::new(cfg);
        let mut seen = Vec::new();
        let result = engine
            .run_parallel_with_progress(&base, 3, &mut |p| {
                assert_eq!(p.total, 40);
                seen.push(p.completed);
            })
            .unwrap();
        assert_eq!(seen, (1..=40).collect::<Vec<_>>());
        assert!(result.bitwise_eq(&engine.run_with_base_data(&base).unwrap()));
    }

    #[test]
    fn test_run_replication_strong_signal() {
        let cfg = SimulationConfig::builder()
            .m(4)
            .m0(2)
            .distribution(Distribution::Equal)
            .signal_strength(40.0)
            .n_reps(1)
            .build()
            .unwrap();
        let engine = SimulationEngine::new(cfg);
        let record = engine.run_replication(&[0.0; 4]).unwrap();
        // Nulls sit at z = 0 (p = 1), alternatives far in the tail.
        assert_eq!(record.power_bonf, 1.0);
        assert_eq!(record.power_bh, 1.0);
        assert_eq!(record.fdr_hoch, 0.0);
        assert_eq!(record.fwer_bh, 0.0);
    }

    #[test]
    fn test_run_replication_wrong_length() {
        let engine = SimulationEngine::new(config(4, 2, Distribution::Equal, 1));
        assert!(engine.run_replication(&[0.0; 3]).is_err());
    }

    #[test]
    fn test_result_serializes_with_field_names() {
        let engine = SimulationEngine::new(config(4, 4, Distribution::Equal, 3));
        let result = engine.run().unwrap();
        let json = serde_json::to_value(&result).unwrap();
        for name in [
            "power_bonf", "power_hoch", "power_bh", "fdr_bonf", "fdr_hoch", "fdr_bh",
            "fwer_bonf", "fwer_hoch", "fwer_bh", "config",
        ] {
            assert!(json.get(name).is_some(), "missing {name}");
        }
    }
}
