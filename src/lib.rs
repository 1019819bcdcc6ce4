//! # fdrsim
//!
//! Reproducible Monte Carlo comparison of multiple-testing procedures.
//!
//! For each configuration `(m, m0, distribution)` the engine simulates
//! `n_reps` families of `m` z-tests, applies Bonferroni, Hochberg's step-up
//! and Benjamini-Hochberg to the same p-values, and records per-replication
//! power, false discovery proportion and family-wise error:
//! - Deterministic PCG64 noise from a single seed
//! - Shared base noise across configurations with equal `m` (variance
//!   reduction)
//! - NaN-aware summaries and an integrity-checked result store
//!
//! ## Example
//!
//! ```rust
//! use fdrsim::prelude::*;
//!
//! let config = SimulationConfig::builder()
//!     .m(8)
//!     .m0(4)
//!     .distribution(Distribution::Equal)
//!     .n_reps(100)
//!     .build()?;
//!
//! let result = SimulationEngine::new(config).run()?;
//! assert_eq!(result.power_bh.len(), 100);
//! # Ok::<(), fdrsim::SimError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::suboptimal_flops,
    clippy::imprecise_flops,
    clippy::missing_const_for_fn,
    clippy::needless_range_loop,
)]

pub mod cli;
pub mod config;
pub mod domains;
pub mod engine;
pub mod error;
pub mod store;
pub mod study;
pub mod summary;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{
        Distribution, ResultKey, SimulationConfig, SimulationConfigBuilder, StudyConfig,
    };
    pub use crate::domains::generator::{generate_base_data, BaseNoiseMatrix, NoiseCache};
    pub use crate::domains::metrics::{compute_fdr, compute_fwer, compute_power};
    pub use crate::domains::procedures::{
        benjamini_hochberg, bonferroni, compute_pvalues, hochberg, Procedure,
    };
    pub use crate::engine::rng::SimRng;
    pub use crate::engine::{
        ReplicationProgress, ReplicationRecord, SimulationEngine, SimulationResult,
    };
    pub use crate::error::{SimError, SimResult};
    pub use crate::store::ResultStore;
    pub use crate::study::{ReproducibilityReport, Study, StudyProgress};
    pub use crate::summary::{summarize_all, ConfigSummary, MethodSummary};
}

/// Re-export for public API
pub use error::{SimError, SimResult};
