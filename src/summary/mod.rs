//! Summary statistics over stored replication arrays.
//!
//! Power arrays hold NaN for configurations without false nulls, so every
//! reduction here skips NaN and yields NaN when nothing is left.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{Distribution, ResultKey};
use crate::domains::procedures::Procedure;
use crate::engine::SimulationResult;

/// Slack applied to the BH bound `pi0 * alpha` when checking control.
pub const FDR_CONTROL_TOLERANCE: f64 = 1.1;

fn non_nan(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).collect()
}

fn sorted_values(values: &[f64]) -> Vec<f64> {
    let mut clean = non_nan(values);
    clean.sort_by(f64::total_cmp);
    clean
}

/// Mean ignoring NaN.
#[must_use]
pub fn nan_mean(values: &[f64]) -> f64 {
    let clean = non_nan(values);
    if clean.is_empty() {
        return f64::NAN;
    }
    clean.iter().sum::<f64>() / clean.len() as f64
}

/// Population standard deviation (divisor `n`) ignoring NaN.
#[must_use]
pub fn nan_std(values: &[f64]) -> f64 {
    let clean = non_nan(values);
    if clean.is_empty() {
        return f64::NAN;
    }
    let n = clean.len() as f64;
    let mean = clean.iter().sum::<f64>() / n;
    let variance = clean.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Minimum ignoring NaN.
#[must_use]
pub fn nan_min(values: &[f64]) -> f64 {
    sorted_values(values).first().copied().unwrap_or(f64::NAN)
}

/// Maximum ignoring NaN.
#[must_use]
pub fn nan_max(values: &[f64]) -> f64 {
    sorted_values(values).last().copied().unwrap_or(f64::NAN)
}

/// Percentile `q` in `[0, 100]` ignoring NaN.
///
/// Linear interpolation between the two closest ranks: position
/// `q / 100 * (n - 1)` in the sorted values.
#[must_use]
pub fn nan_percentile(values: &[f64], q: f64) -> f64 {
    let sorted = sorted_values(values);
    percentile_of_sorted(&sorted, q)
}

/// Median ignoring NaN.
#[must_use]
pub fn nan_median(values: &[f64]) -> f64 {
    nan_percentile(values, 50.0)
}

fn percentile_of_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() || q.is_nan() {
        return f64::NAN;
    }
    let position = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lower = position.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Distribution of per-replication power.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerStats {
    /// Mean.
    pub mean: f64,
    /// Median.
    pub median: f64,
    /// Population standard deviation.
    pub sd: f64,
    /// Minimum.
    pub min: f64,
    /// Maximum.
    pub max: f64,
    /// 25th percentile.
    pub q25: f64,
    /// 75th percentile.
    pub q75: f64,
}

impl PowerStats {
    /// Reduce a power array.
    #[must_use]
    pub fn from_values(values: &[f64]) -> Self {
        let sorted = sorted_values(values);
        Self {
            mean: nan_mean(values),
            median: percentile_of_sorted(&sorted, 50.0),
            sd: nan_std(values),
            min: sorted.first().copied().unwrap_or(f64::NAN),
            max: sorted.last().copied().unwrap_or(f64::NAN),
            q25: percentile_of_sorted(&sorted, 25.0),
            q75: percentile_of_sorted(&sorted, 75.0),
        }
    }
}

/// Distribution of per-replication false discovery proportions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FdrStats {
    /// Mean, the realized FDR.
    pub mean: f64,
    /// Median.
    pub median: f64,
    /// Population standard deviation.
    pub sd: f64,
    /// Maximum.
    pub max: f64,
}

impl FdrStats {
    /// Reduce an FDR array.
    #[must_use]
    pub fn from_values(values: &[f64]) -> Self {
        Self {
            mean: nan_mean(values),
            median: nan_median(values),
            sd: nan_std(values),
            max: nan_max(values),
        }
    }
}

/// Summary of one procedure on one configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MethodSummary {
    /// Procedure summarized.
    pub procedure: Procedure,
    /// Power statistics.
    pub power: PowerStats,
    /// FDR statistics.
    pub fdr: FdrStats,
    /// Realized family-wise error rate.
    pub fwer_mean: f64,
}

impl MethodSummary {
    /// Summarize `procedure`'s arrays in `result`.
    #[must_use]
    pub fn from_result(result: &SimulationResult, procedure: Procedure) -> Self {
        Self {
            procedure,
            power: PowerStats::from_values(result.power(procedure)),
            fdr: FdrStats::from_values(result.fdr(procedure)),
            fwer_mean: nan_mean(result.fwer(procedure)),
        }
    }
}

/// Summary row of one `(m, m0, distribution)` configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSummary {
    /// Configuration key.
    pub key: ResultKey,
    /// Number of false nulls.
    pub m1: usize,
    /// `m0 / m`.
    pub null_proportion: f64,
    /// Signal strength `L`.
    pub signal_strength: f64,
    /// Test level.
    pub alpha: f64,
    /// Replications summarized.
    pub n_reps: usize,
    /// Seed of the run.
    pub seed: u64,
    /// Bonferroni summary.
    pub bonferroni: MethodSummary,
    /// Hochberg summary.
    pub hochberg: MethodSummary,
    /// Benjamini-Hochberg summary.
    pub benjamini_hochberg: MethodSummary,
    /// Hochberg mean power over Bonferroni mean power.
    pub power_gain_hoch: f64,
    /// BH mean power over Bonferroni mean power.
    pub power_gain_bh: f64,
    /// Hochberg mean power minus Bonferroni mean power.
    pub power_diff_hoch: f64,
    /// BH mean power minus Bonferroni mean power.
    pub power_diff_bh: f64,
    /// Theoretical BH bound `null_proportion * alpha`.
    pub fdr_bound: f64,
    /// Whether BH's realized FDR is within the bound (10% slack).
    pub fdr_controlled: bool,
}

impl ConfigSummary {
    /// Summarize one result.
    #[must_use]
    pub fn from_result(result: &SimulationResult) -> Self {
        let config = &result.config;
        let bonferroni = MethodSummary::from_result(result, Procedure::Bonferroni);
        let hochberg = MethodSummary::from_result(result, Procedure::Hochberg);
        let benjamini_hochberg = MethodSummary::from_result(result, Procedure::BenjaminiHochberg);

        let bonf_mean = bonferroni.power.mean;
        let gain = |mean: f64| {
            if bonf_mean > 0.0 {
                mean / bonf_mean
            } else {
                f64::NAN
            }
        };

        let null_proportion = config.null_proportion();
        let fdr_bound = null_proportion * config.alpha();

        Self {
            key: config.key(),
            m1: config.m1(),
            null_proportion,
            signal_strength: config.signal_strength(),
            alpha: config.alpha(),
            n_reps: result.n_reps(),
            seed: config.seed(),
            power_gain_hoch: gain(hochberg.power.mean),
            power_gain_bh: gain(benjamini_hochberg.power.mean),
            power_diff_hoch: hochberg.power.mean - bonf_mean,
            power_diff_bh: benjamini_hochberg.power.mean - bonf_mean,
            fdr_bound,
            fdr_controlled: benjamini_hochberg.fdr.mean <= fdr_bound * FDR_CONTROL_TOLERANCE,
            bonferroni,
            hochberg,
            benjamini_hochberg,
        }
    }

    /// Summary of `procedure`.
    #[must_use]
    pub const fn method(&self, procedure: Procedure) -> &MethodSummary {
        match procedure {
            Procedure::Bonferroni => &self.bonferroni,
            Procedure::Hochberg => &self.hochberg,
            Procedure::BenjaminiHochberg => &self.benjamini_hochberg,
        }
    }

    /// Number of hypotheses.
    #[must_use]
    pub const fn m(&self) -> usize {
        self.key.m
    }

    /// Number of true nulls.
    #[must_use]
    pub const fn m0(&self) -> usize {
        self.key.m0
    }

    /// Effect-size distribution.
    #[must_use]
    pub const fn distribution(&self) -> Distribution {
        self.key.distribution
    }
}

/// Summarize every result, ordered by `m`, then null proportion, then
/// distribution.
#[must_use]
pub fn summarize_all(results: &BTreeMap<ResultKey, SimulationResult>) -> Vec<ConfigSummary> {
    let mut summaries: Vec<ConfigSummary> = results.values().map(ConfigSummary::from_result).collect();
    summaries.sort_by(|a, b| {
        a.m()
            .cmp(&b.m())
            .then(a.null_proportion.total_cmp(&b.null_proportion))
            .then(a.distribution().cmp(&b.distribution()))
    });
    summaries
}
