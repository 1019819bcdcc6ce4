//! Multiple-testing decision procedures.
//!
//! Every procedure maps a length-`m` vector of two-sided p-values and a
//! level `alpha` to a length-`m` rejection vector.
//!
//! ```text
//! Bonferroni:          reject H_i  iff  p_i <= alpha / m
//! Hochberg (1988):     k = max{ i : p_(i) <= alpha / (m + 1 - i) }
//! Benjamini-Hochberg:  k = max{ i : p_(i) <= (i / m) * q }
//! ```
//!
//! Both step-up rules reject the `k` smallest p-values. Ranks come from a
//! stable sort, so tied p-values keep their original index order.

use std::f64::consts::SQRT_2;

use serde::{Deserialize, Serialize};

/// Standard normal CDF.
#[must_use]
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * libm::erfc(-z / SQRT_2)
}

/// Two-sided p-value `2 * (1 - Phi(|z|))`.
///
/// Evaluated as `erfc(|z| / sqrt(2))`, which keeps full relative precision in
/// the tail where `1 - Phi` would cancel.
#[must_use]
pub fn two_sided_pvalue(z: f64) -> f64 {
    libm::erfc(z.abs() / SQRT_2)
}

/// Two-sided p-values for a vector of z statistics.
#[must_use]
pub fn compute_pvalues(statistics: &[f64]) -> Vec<f64> {
    statistics.iter().map(|&z| two_sided_pvalue(z)).collect()
}

/// Bonferroni: reject `i` iff `p_i <= alpha / m`.
#[must_use]
pub fn bonferroni(pvalues: &[f64], alpha: f64) -> Vec<bool> {
    let threshold = alpha / pvalues.len() as f64;
    pvalues.iter().map(|&p| p <= threshold).collect()
}

/// Hochberg's step-up procedure.
#[must_use]
pub fn hochberg(pvalues: &[f64], alpha: f64) -> Vec<bool> {
    let m = pvalues.len();
    step_up(pvalues, |rank| alpha / (m + 1 - rank) as f64)
}

/// Benjamini-Hochberg FDR procedure at level `q`.
#[must_use]
pub fn benjamini_hochberg(pvalues: &[f64], q: f64) -> Vec<bool> {
    let m = pvalues.len() as f64;
    step_up(pvalues, |rank| (rank as f64 / m) * q)
}

/// Indices of `pvalues` in ascending p-value order (stable).
#[must_use]
pub fn ascending_order(pvalues: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..pvalues.len()).collect();
    order.sort_by(|&a, &b| pvalues[a].total_cmp(&pvalues[b]));
    order
}

/// Rejection count of a step-up rule on ascending `sorted` p-values.
///
/// Scans from rank `m` down to 1 and stops at the first (largest) rank with
/// `p_(rank) <= threshold(rank)`; ranks are 1-indexed. Returns 0 if no rank
/// qualifies.
pub fn step_up_count<F>(sorted: &[f64], threshold: F) -> usize
where
    F: Fn(usize) -> f64,
{
    (1..=sorted.len())
        .rev()
        .find(|&rank| sorted[rank - 1] <= threshold(rank))
        .unwrap_or(0)
}

fn step_up<F>(pvalues: &[f64], threshold: F) -> Vec<bool>
where
    F: Fn(usize) -> f64,
{
    let order = ascending_order(pvalues);
    let sorted: Vec<f64> = order.iter().map(|&i| pvalues[i]).collect();
    let k = step_up_count(&sorted, threshold);

    let mut rejections = vec![false; pvalues.len()];
    for &index in &order[..k] {
        rejections[index] = true;
    }
    rejections
}

/// The three procedures compared by the study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Procedure {
    /// Bonferroni single-step.
    Bonferroni,
    /// Hochberg step-up.
    Hochberg,
    /// Benjamini-Hochberg step-up.
    BenjaminiHochberg,
}

impl Procedure {
    /// All procedures in reporting order.
    pub const ALL: [Self; 3] = [Self::Bonferroni, Self::Hochberg, Self::BenjaminiHochberg];

    /// Apply the procedure.
    #[must_use]
    pub fn apply(self, pvalues: &[f64], alpha: f64) -> Vec<bool> {
        match self {
            Self::Bonferroni => bonferroni(pvalues, alpha),
            Self::Hochberg => hochberg(pvalues, alpha),
            Self::BenjaminiHochberg => benjamini_hochberg(pvalues, alpha),
        }
    }

    /// Suffix used in result field names (`power_bonf`, ...).
    #[must_use]
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::Bonferroni => "bonf",
            Self::Hochberg => "hoch",
            Self::BenjaminiHochberg => "bh",
        }
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bonferroni => "Bonferroni",
            Self::Hochberg => "Hochberg",
            Self::BenjaminiHochberg => "BH",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(rejections: &[bool]) -> usize {
        rejections.iter().filter(|&&r| r).count()
    }

    #[test]
    fn test_normal_cdf_known_values() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-15);
        assert!((normal_cdf(1.959_963_984_540_054) - 0.975).abs() < 1e-12);
        assert!((normal_cdf(-1.959_963_984_540_054) - 0.025).abs() < 1e-12);
    }

    #[test]
    fn test_two_sided_pvalue() {
        assert!((two_sided_pvalue(0.0) - 1.0).abs() < 1e-15);
        assert!((two_sided_pvalue(1.959_963_984_540_054) - 0.05).abs() < 1e-12);
        assert_eq!(two_sided_pvalue(2.5), two_sided_pvalue(-2.5));
        // Deep tail keeps relative precision instead of collapsing to 0.
        let p = two_sided_pvalue(10.0);
        assert!(p > 0.0 && p < 1e-22, "p = {p}");
    }

    #[test]
    fn test_pvalues_match_cdf_definition() {
        for z in [-3.0, -1.0, -0.2, 0.0, 0.7, 1.5, 2.8] {
            let p = compute_pvalues(&[z])[0];
            let expected = 2.0 * (1.0 - normal_cdf(f64::abs(z)));
            assert!((p - expected).abs() < 1e-12, "z = {z}");
        }
    }

    #[test]
    fn test_bonferroni_simple_case() {
        let pvalues = [0.001, 0.004, 0.010, 0.020, 0.050];
        let rejections = bonferroni(&pvalues, 0.05);
        assert_eq!(rejections, vec![true, true, true, false, false]);
        assert_eq!(count(&rejections), 3);
    }

    #[test]
    fn test_bonferroni_boundary_is_inclusive() {
        let pvalues = [0.025, 0.0250001];
        assert_eq!(bonferroni(&pvalues, 0.05), vec![true, false]);
    }

    #[test]
    fn test_hochberg_simple_case() {
        // p_(5) = 0.05 <= 0.05 / 1, so every hypothesis is rejected.
        let pvalues = [0.001, 0.004, 0.010, 0.020, 0.050];
        assert_eq!(count(&hochberg(&pvalues, 0.05)), 5);

        // sorted: 0.004 (0.0125), 0.03 (0.01667), 0.04 (0.025), 0.2 (0.05)
        let pvalues = [0.04, 0.004, 0.03, 0.2];
        assert_eq!(hochberg(&pvalues, 0.05), vec![false, true, false, false]);
    }

    #[test]
    fn test_hochberg_step_up_skips_failed_lower_ranks() {
        // Rank 1 fails its own threshold but rank 2 passes: step-up rejects both.
        // thresholds: rank 1 -> 0.025, rank 2 -> 0.05
        let pvalues = [0.03, 0.04];
        assert_eq!(hochberg(&pvalues, 0.05), vec![true, true]);
        let pvalues = [0.03, 0.06];
        // rank 2: 0.06 > 0.05; rank 1: 0.03 > 0.025
        assert_eq!(hochberg(&pvalues, 0.05), vec![false, false]);
    }

    #[test]
    fn test_bh_simple_case() {
        let pvalues = [0.001, 0.004, 0.010, 0.020, 0.050, 0.100, 0.200, 0.500, 0.800, 0.900];
        let q = 0.05;
        let m = pvalues.len();

        let mut expected = 0;
        for (i, &p) in pvalues.iter().enumerate() {
            if p <= ((i + 1) as f64 / m as f64) * q {
                expected = i + 1;
            }
        }

        let rejections = benjamini_hochberg(&pvalues, q);
        assert_eq!(count(&rejections), expected);
        assert_eq!(expected, 4);
        assert!(rejections[..4].iter().all(|&r| r));
    }

    #[test]
    fn test_bh_rejects_smallest_regardless_of_input_order() {
        let pvalues = [0.9, 0.001, 0.5, 0.004];
        assert_eq!(benjamini_hochberg(&pvalues, 0.05), vec![false, true, false, true]);
    }

    #[test]
    fn test_empty_input() {
        assert!(bonferroni(&[], 0.05).is_empty());
        assert!(hochberg(&[], 0.05).is_empty());
        assert!(benjamini_hochberg(&[], 0.05).is_empty());
    }

    #[test]
    fn test_ties_are_stable() {
        assert_eq!(ascending_order(&[0.3, 0.1, 0.3, 0.1]), vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_step_up_count_none() {
        assert_eq!(step_up_count(&[0.5, 0.6], |_| 0.01), 0);
        assert_eq!(step_up_count(&[], |_| 1.0), 0);
    }

    #[test]
    fn test_procedure_dispatch() {
        let pvalues = [0.001, 0.004, 0.010, 0.020, 0.050];
        assert_eq!(Procedure::Bonferroni.apply(&pvalues, 0.05), bonferroni(&pvalues, 0.05));
        assert_eq!(Procedure::Hochberg.apply(&pvalues, 0.05), hochberg(&pvalues, 0.05));
        assert_eq!(
            Procedure::BenjaminiHochberg.apply(&pvalues, 0.05),
            benjamini_hochberg(&pvalues, 0.05)
        );
        let names: Vec<&str> = Procedure::ALL.iter().map(|p| p.short_name()).collect();
        assert_eq!(names, vec!["bonf", "hoch", "bh"]);
    }
}
