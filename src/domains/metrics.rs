//! Per-replication error metrics.
//!
//! Given a rejection vector and the true-null indicator:
//!
//! | Metric | Definition | Degenerate case |
//! |--------|------------|-----------------|
//! | power  | `S / m1` | `m1 == 0` → NaN |
//! | FDR    | `V / R`  | `R == 0` → 0.0 |
//! | FWER   | `1` if `V > 0` else `0` | none |
//!
//! where `V` counts rejected true nulls, `S` rejected false nulls and
//! `R = V + S`.

/// Confusion counts for one replication and one procedure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RejectionCounts {
    /// Rejected true nulls (false discoveries).
    pub false_discoveries: usize,
    /// Rejected false nulls (true discoveries).
    pub true_discoveries: usize,
    /// Number of false nulls.
    pub alternatives: usize,
}

impl RejectionCounts {
    /// Tally rejections against the truth.
    ///
    /// Extra entries in the longer slice are ignored.
    #[must_use]
    pub fn tally(rejections: &[bool], true_nulls: &[bool]) -> Self {
        let mut counts = Self::default();
        for (&rejected, &null) in rejections.iter().zip(true_nulls) {
            match (null, rejected) {
                (true, true) => counts.false_discoveries += 1,
                (false, true) => {
                    counts.true_discoveries += 1;
                    counts.alternatives += 1;
                }
                (false, false) => counts.alternatives += 1,
                (true, false) => {}
            }
        }
        counts
    }

    /// Total rejections `R`.
    #[must_use]
    pub const fn rejections(&self) -> usize {
        self.false_discoveries + self.true_discoveries
    }

    /// `S / m1`, NaN without alternatives.
    #[must_use]
    pub fn power(&self) -> f64 {
        if self.alternatives == 0 {
            return f64::NAN;
        }
        self.true_discoveries as f64 / self.alternatives as f64
    }

    /// `V / R`, zero without rejections.
    #[must_use]
    pub fn fdr(&self) -> f64 {
        let r = self.rejections();
        if r == 0 {
            return 0.0;
        }
        self.false_discoveries as f64 / r as f64
    }

    /// 1.0 if any true null was rejected.
    #[must_use]
    pub fn fwer(&self) -> f64 {
        if self.false_discoveries > 0 {
            1.0
        } else {
            0.0
        }
    }
}

/// Fraction of false nulls rejected; NaN when there are none.
#[must_use]
pub fn compute_power(rejections: &[bool], true_nulls: &[bool]) -> f64 {
    RejectionCounts::tally(rejections, true_nulls).power()
}

/// False discovery proportion; 0.0 when nothing is rejected.
#[must_use]
pub fn compute_fdr(rejections: &[bool], true_nulls: &[bool]) -> f64 {
    RejectionCounts::tally(rejections, true_nulls).fdr()
}

/// Family-wise error indicator.
#[must_use]
pub fn compute_fwer(rejections: &[bool], true_nulls: &[bool]) -> f64 {
    RejectionCounts::tally(rejections, true_nulls).fwer()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power() {
        // 2 nulls, 5 alternatives, 3 of them rejected.
        let is_null = [true, true, false, false, false, false, false];
        let rejections = [false, false, true, true, true, false, false];
        assert!((compute_power(&rejections, &is_null) - 0.6).abs() < 1e-15);
    }

    #[test]
    fn test_power_ten_hypotheses() {
        // Alternatives are the last five; three of them rejected.
        let rejections = [
            false, false, true, true, true, false, false, true, true, true,
        ];
        let is_null = [true, true, true, true, true, false, false, false, false, false];
        assert!((compute_power(&rejections, &is_null) - 3.0 / 5.0).abs() < 1e-15);
    }

    #[test]
    fn test_fdr_eight_hypotheses() {
        // Four rejections, two of them true nulls.
        let rejections = [true, true, true, true, false, false, false, false];
        let is_null = [true, true, false, false, false, false, true, true];
        assert!((compute_fdr(&rejections, &is_null) - 2.0 / 4.0).abs() < 1e-15);
    }

    #[test]
    fn test_power_nan_without_alternatives() {
        let is_null = [true, true, true];
        assert!(compute_power(&[true, false, false], &is_null).is_nan());
        assert!(compute_power(&[false, false, false], &is_null).is_nan());
    }

    #[test]
    fn test_fdr() {
        // 4 rejections, 2 of them true nulls.
        let is_null = [true, true, false, false, true];
        let rejections = [true, true, true, true, false];
        assert!((compute_fdr(&rejections, &is_null) - 0.5).abs() < 1e-15);
    }

    #[test]
    fn test_fdr_zero_without_rejections() {
        let is_null = [true, false, false];
        assert_eq!(compute_fdr(&[false, false, false], &is_null), 0.0);
    }

    #[test]
    fn test_fwer() {
        let is_null = [true, false, false];
        assert_eq!(compute_fwer(&[false, true, true], &is_null), 0.0);
        assert_eq!(compute_fwer(&[true, false, false], &is_null), 1.0);
        assert_eq!(compute_fwer(&[false, false, false], &is_null), 0.0);
    }

    #[test]
    fn test_counts() {
        let is_null = [true, false, true, false];
        let counts = RejectionCounts::tally(&[true, true, false, false], &is_null);
        assert_eq!(
            counts,
            RejectionCounts {
                false_discoveries: 1,
                true_discoveries: 1,
                alternatives: 2,
            }
        );
        assert_eq!(counts.rejections(), 2);
    }

    #[test]
    fn test_all_alternatives_all_rejected() {
        let is_null = [false; 4];
        let rejections = [true; 4];
        assert_eq!(compute_power(&rejections, &is_null), 1.0);
        assert_eq!(compute_fdr(&rejections, &is_null), 0.0);
        assert_eq!(compute_fwer(&rejections, &is_null), 0.0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Metrics stay in [0, 1] and are consistent with each other.
        #[test]
        fn prop_metric_ranges(pairs in prop::collection::vec((any::<bool>(), any::<bool>()), 1..64)) {
            let (is_null, rejections): (Vec<bool>, Vec<bool>) = pairs.into_iter().unzip();

            let power = compute_power(&rejections, &is_null);
            let fdr = compute_fdr(&rejections, &is_null);
            let fwer = compute_fwer(&rejections, &is_null);

            if is_null.iter().all(|&n| n) {
                prop_assert!(power.is_nan());
            } else {
                prop_assert!((0.0..=1.0).contains(&power));
            }
            prop_assert!((0.0..=1.0).contains(&fdr));
            prop_assert!(fwer == 0.0 || fwer == 1.0);
            // Any false discovery makes FDR positive and FWER one.
            prop_assert_eq!(fdr > 0.0, fwer == 1.0);
        }
    }
}
