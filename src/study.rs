//! Study orchestration over the `(m, null proportion, distribution)` grid.
//!
//! A `Study` owns the [`NoiseCache`]: every configuration with the same `m`
//! runs against one shared base noise matrix, so differences between
//! null proportions and distributions are not confounded by the noise draw.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{ResultKey, SimulationConfig, StudyConfig};
use crate::domains::generator::NoiseCache;
use crate::engine::{ReplicationProgress, SimulationEngine, SimulationResult};
use crate::error::SimResult;
use crate::store::ResultStore;

/// Progress across the whole study.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StudyProgress {
    /// Configuration being run.
    pub key: ResultKey,
    /// 1-based position of the configuration in the grid.
    pub config_index: usize,
    /// Configurations in the grid.
    pub config_total: usize,
    /// Progress inside the configuration.
    pub replication: ReplicationProgress,
}

/// Outcome of a reproducibility check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReproducibilityReport {
    /// Configurations checked.
    pub checked: usize,
    /// Configurations whose repeated runs differed.
    pub mismatches: Vec<ResultKey>,
}

impl ReproducibilityReport {
    /// Whether every configuration reproduced bit for bit.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Runs every configuration of a [`StudyConfig`].
#[derive(Debug)]
pub struct Study {
    config: StudyConfig,
    noise: NoiseCache,
}

impl Study {
    /// Create a study with an empty noise cache.
    #[must_use]
    pub fn new(config: StudyConfig) -> Self {
        Self {
            config,
            noise: NoiseCache::new(),
        }
    }

    /// Study configuration.
    #[must_use]
    pub const fn config(&self) -> &StudyConfig {
        &self.config
    }

    /// Shared noise matrices generated so far.
    #[must_use]
    pub const fn noise_cache(&self) -> &NoiseCache {
        &self.noise
    }

    /// Grid of simulation configurations.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any grid point is invalid.
    pub fn configs(&self) -> SimResult<Vec<SimulationConfig>> {
        self.config.configs()
    }

    /// Run one configuration against the cached base noise for its `m`.
    ///
    /// # Errors
    ///
    /// Propagates engine errors.
    pub fn run_config(
        &mut self,
        config: &SimulationConfig,
        progress: &mut dyn FnMut(ReplicationProgress),
    ) -> SimResult<SimulationResult> {
        let base = self.noise.get_or_generate(config);
        let engine = SimulationEngine::new(config.clone());
        match self.config.parallel_workers {
            Some(workers) => engine.run_parallel_with_progress(&base, workers, progress),
            None => engine.run_with_progress(Some(&base), progress),
        }
    }

    /// Run the whole grid.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid configuration or engine error; no partial
    /// map is returned.
    pub fn run(
        &mut self,
        progress: &mut dyn FnMut(StudyProgress),
    ) -> SimResult<BTreeMap<ResultKey, SimulationResult>> {
        let mut results = BTreeMap::new();
        self.for_each_result(progress, |result| {
            results.insert(result.key(), result);
            Ok(())
        })?;
        Ok(results)
    }

    /// Run the grid, saving each result as soon as it is computed.
    ///
    /// # Errors
    ///
    /// Propagates engine and store errors.
    pub fn run_and_store(
        &mut self,
        store: &ResultStore,
        progress: &mut dyn FnMut(StudyProgress),
    ) -> SimResult<Vec<PathBuf>> {
        let mut paths = Vec::new();
        self.for_each_result(progress, |result| {
            paths.push(store.save(&result)?);
            Ok(())
        })?;
        info!(files = paths.len(), dir = %store.dir().display(), "Study stored");
        Ok(paths)
    }

    fn for_each_result<F>(
        &mut self,
        progress: &mut dyn FnMut(StudyProgress),
        mut sink: F,
    ) -> SimResult<()>
    where
        F: FnMut(SimulationResult) -> SimResult<()>,
    {
        let configs = self.configs()?;
        let config_total = configs.len();
        info!(
            configurations = config_total,
            n_reps = self.config.n_reps,
            seed = self.config.seed,
            "Study started"
        );

        let started = Instant::now();
        for (index, config) in configs.iter().enumerate() {
            let key = config.key();
            let config_started = Instant::now();
            let result = self.run_config(config, &mut |replication| {
                progress(StudyProgress {
                    key,
                    config_index: index + 1,
                    config_total,
                    replication,
                });
            })?;
            info!(
                %key,
                elapsed = ?config_started.elapsed(),
                "Configuration complete ({}/{config_total})",
                index + 1
            );
            sink(result)?;
        }

        info!(
            configurations = config_total,
            cached_noise = self.noise.len(),
            elapsed = ?started.elapsed(),
            "Study finished"
        );
        Ok(())
    }

    /// Run every configuration twice, once on the shared base noise and once
    /// with freshly sampled noise, and compare the outputs bit for bit.
    ///
    /// # Errors
    ///
    /// Propagates engine errors.
    pub fn verify(&mut self) -> SimResult<ReproducibilityReport> {
        let mut report = ReproducibilityReport::default();
        for config in self.configs()? {
            let shared = self.run_config(&config, &mut |_| {})?;
            let fresh = SimulationEngine::new(config.clone()).run()?;
            report.checked += 1;
            if !shared.bitwise_eq(&fresh) {
                warn!(key = %config.key(), "Configuration did not reproduce");
                report.mismatches.push(config.key());
            }
        }
        info!(
            checked = report.checked,
            mismatches = report.mismatches.len(),
            "Reproducibility check finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Distribution;

    fn small_study() -> StudyConfig {
        StudyConfig {
            m_values: vec![4, 8],
            null_proportions: vec![0.0, 0.5],
            distributions: vec![Distribution::Decreasing, Distribution::Increasing],
            n_reps: 30,
            ..StudyConfig::default()
        }
    }

    #[test]
    fn test_run_covers_grid() {
        let mut study = Study::new(small_study());
        let results = study.run(&mut |_| {}).unwrap();
        assert_eq!(results.len(), 8);
        assert!(results.values().all(|r| r.n_reps() == 30));
        // One base matrix per distinct m.
        assert_eq!(study.noise_cache().len(), 2);
    }

    #[test]
    fn test_same_m_shares_noise() {
        let mut study = Study::new(small_study());
        let configs = study.configs().unwrap();
        assert_eq!(configs[0].m(), configs[3].m());
        assert_ne!(configs[0].key(), configs[3].key());

        study.run_config(&configs[0], &mut |_| {}).unwrap();
        study.run_config(&configs[3], &mut |_| {}).unwrap();
        assert_eq!(study.noise_cache().len(), 1);
    }

    #[test]
    fn test_progress_reports_every_configuration() {
        let mut study = Study::new(small_study());
        let mut last_per_config = BTreeMap::new();
        study
            .run(&mut |p| {
                last_per_config.insert(p.config_index, p.replication.completed);
                assert_eq!(p.config_total, 8);
            })
            .unwrap();
        assert_eq!(last_per_config.len(), 8);
        assert!(last_per_config.values().all(|&completed| completed == 30));
    }

    #[test]
    fn test_parallel_study_matches_sequential() {
        let sequential = Study::new(small_study()).run(&mut |_| {}).unwrap();
        let parallel = Study::new(StudyConfig {
            parallel_workers: Some(3),
            ..small_study()
        })
        .run(&mut |_| {})
        .unwrap();
        for (key, result) in &sequential {
            assert!(result.bitwise_eq(&parallel[key]), "{key}");
        }
    }

    #[test]
    fn test_parallel_progress_reports_every_replication() {
        let mut study = Study::new(StudyConfig {
            parallel_workers: Some(2),
            ..small_study()
        });
        let mut calls = 0;
        study
            .run(&mut |p| {
                calls += 1;
                assert!(p.replication.completed <= p.replication.total);
            })
            .unwrap();
        assert_eq!(calls, 8 * 30);
    }

    #[test]
    fn test_colliding_grid_is_rejected_before_running() {
        let mut study = Study::new(StudyConfig {
            m_values: vec![4],
            null_proportions: vec![0.1, 0.2],
            ..small_study()
        });
        let mut calls = 0;
        assert!(study.run(&mut |_| calls += 1).is_err());
        assert_eq!(calls, 0);
        assert!(study.noise_cache().is_empty());
    }

    #[test]
    fn test_verify_passes() {
        let mut study = Study::new(small_study());
        let report = study.verify().unwrap();
        assert_eq!(report.checked, 8);
        assert!(report.passed());
    }

    #[test]
    fn test_run_and_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let mut study = Study::new(small_study());
        let paths = study.run_and_store(&store, &mut |_| {}).unwrap();
        assert_eq!(paths.len(), 8);
        assert_eq!(store.load_all().unwrap().len(), 8);
    }
}
