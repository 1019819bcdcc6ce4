//! Statistical building blocks of the simulation.
//!
//! - Generator: mean vectors, base noise and per-replication statistics
//! - Procedures: p-values and the Bonferroni, Hochberg and BH decisions
//! - Metrics: power, FDR and FWER of one rejection vector

pub mod generator;
pub mod metrics;
pub mod procedures;

pub use generator::{
    allocate_level_counts, compose_replication_statistic, effect_levels, generate_alternative_means,
    generate_base_data, BaseNoiseMatrix, MeanVector, NoiseCache, ReplicationSampler, EFFECT_LEVELS,
};
pub use metrics::{compute_fdr, compute_fwer, compute_power, RejectionCounts};
pub use procedures::{
    benjamini_hochberg, bonferroni, compute_pvalues, hochberg, normal_cdf, step_up_count,
    two_sided_pvalue, Procedure,
};
