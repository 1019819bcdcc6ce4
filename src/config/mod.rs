//! Simulation and study configuration.
//!
//! Implements Poka-Yoke (mistake-proofing) through:
//! - A closed [`Distribution`] enum, so unknown effect-distribution tags are
//!   rejected when the configuration is built rather than when it is used
//! - An immutable [`SimulationConfig`] that can only be obtained through
//!   validation (constructor, builder or deserialization)
//! - YAML study files checked by serde (schema) and validator (ranges)

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{SimError, SimResult};

/// Default signal strength `L` of the published study.
pub const DEFAULT_SIGNAL_STRENGTH: f64 = 5.0;
/// Default significance level.
pub const DEFAULT_ALPHA: f64 = 0.05;
/// Default number of Monte Carlo replications.
pub const DEFAULT_N_REPS: usize = 20_000;
/// Default master seed.
pub const DEFAULT_SEED: u64 = 12_345;

/// How the `m1` false nulls are spread over the four effect levels
/// `L/4, L/2, 3L/4, L`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Distribution {
    /// Linearly decreasing: most false nulls at the weakest effect (`D`).
    Decreasing,
    /// Equally distributed over the four levels (`E`).
    Equal,
    /// Linearly increasing: most false nulls at the strongest effect (`I`).
    Increasing,
}

impl Distribution {
    /// All distributions in `D, E, I` order.
    pub const ALL: [Self; 3] = [Self::Decreasing, Self::Equal, Self::Increasing];

    /// Single-letter code.
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Decreasing => 'D',
            Self::Equal => 'E',
            Self::Increasing => 'I',
        }
    }

    /// Relative weight of each effect level, lowest level first.
    #[must_use]
    pub const fn weights(self) -> [u32; 4] {
        match self {
            Self::Decreasing => [4, 3, 2, 1],
            Self::Equal => [1, 1, 1, 1],
            Self::Increasing => [1, 2, 3, 4],
        }
    }

    /// Parse a single-letter code.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for anything but `D`, `E` or `I`.
    pub fn from_code(code: char) -> SimResult<Self> {
        match code {
            'D' => Ok(Self::Decreasing),
            'E' => Ok(Self::Equal),
            'I' => Ok(Self::Increasing),
            other => Err(SimError::config(
                "distribution",
                format!("unknown code '{other}' (expected D, E or I)"),
            )),
        }
    }
}

impl FromStr for Distribution {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(code), None) => Self::from_code(code),
            _ => Err(SimError::config(
                "distribution",
                format!("unknown code '{s}' (expected D, E or I)"),
            )),
        }
    }
}

impl TryFrom<String> for Distribution {
    type Error = SimError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Distribution> for String {
    fn from(value: Distribution) -> Self {
        value.code().to_string()
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = [0u8; 4];
        f.pad(self.code().encode_utf8(&mut buf))
    }
}

/// Identity of one simulated configuration: `(m, m0, distribution)`.
///
/// Ordered by `m`, then `m0`, then distribution (`D < E < I`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResultKey {
    /// Total hypotheses.
    pub m: usize,
    /// True nulls.
    pub m0: usize,
    /// Effect distribution.
    pub distribution: Distribution,
}

impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m={}, m0={}, {}", self.m, self.m0, self.distribution)
    }
}

/// Immutable parameters of one simulation run.
///
/// Only obtainable through [`SimulationConfig::new`],
/// [`SimulationConfig::builder`] or deserialization, all of which validate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SimulationConfigSpec", into = "SimulationConfigSpec")]
pub struct SimulationConfig {
    m: usize,
    m0: usize,
    m1: usize,
    distribution: Distribution,
    signal_strength: f64,
    alpha: f64,
    n_reps: usize,
    seed: u64,
}

impl SimulationConfig {
    /// Create a configuration with the study defaults for `L`, `alpha`,
    /// `n_reps` and `seed`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `m == 0` or `m0 > m`.
    pub fn new(m: usize, m0: usize, distribution: Distribution) -> SimResult<Self> {
        Self::builder()
            .m(m)
            .m0(m0)
            .distribution(distribution)
            .build()
    }

    /// Create a builder for configuration.
    #[must_use]
    pub fn builder() -> SimulationConfigBuilder {
        SimulationConfigBuilder::default()
    }

    /// Total number of hypotheses.
    #[must_use]
    pub const fn m(&self) -> usize {
        self.m
    }

    /// Number of true nulls.
    #[must_use]
    pub const fn m0(&self) -> usize {
        self.m0
    }

    /// Number of false nulls (`m - m0`).
    #[must_use]
    pub const fn m1(&self) -> usize {
        self.m1
    }

    /// Effect distribution.
    #[must_use]
    pub const fn distribution(&self) -> Distribution {
        self.distribution
    }

    /// Signal strength `L`.
    #[must_use]
    pub const fn signal_strength(&self) -> f64 {
        self.signal_strength
    }

    /// Significance level (also the BH target FDR `q`).
    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Number of replications.
    #[must_use]
    pub const fn n_reps(&self) -> usize {
        self.n_reps
    }

    /// Master seed.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Proportion of true nulls, `m0 / m`.
    #[must_use]
    pub fn null_proportion(&self) -> f64 {
        self.m0 as f64 / self.m as f64
    }

    /// Key identifying this configuration in a study.
    #[must_use]
    pub const fn key(&self) -> ResultKey {
        ResultKey {
            m: self.m,
            m0: self.m0,
            distribution: self.distribution,
        }
    }

    /// Builder pre-populated with this configuration's values.
    #[must_use]
    pub const fn to_builder(&self) -> SimulationConfigBuilder {
        SimulationConfigBuilder {
            m: Some(self.m),
            m0: Some(self.m0),
            distribution: Some(self.distribution),
            signal_strength: Some(self.signal_strength),
            alpha: Some(self.alpha),
            n_reps: Some(self.n_reps),
            seed: Some(self.seed),
        }
    }
}

/// Configuration builder for programmatic construction.
#[derive(Debug, Default, Clone)]
pub struct SimulationConfigBuilder {
    m: Option<usize>,
    m0: Option<usize>,
    distribution: Option<Distribution>,
    signal_strength: Option<f64>,
    alpha: Option<f64>,
    n_reps: Option<usize>,
    seed: Option<u64>,
}

impl SimulationConfigBuilder {
    /// Set the total number of hypotheses.
    #[must_use]
    pub const fn m(mut self, m: usize) -> Self {
        self.m = Some(m);
        self
    }

    /// Set the number of true nulls.
    #[must_use]
    pub const fn m0(mut self, m0: usize) -> Self {
        self.m0 = Some(m0);
        self
    }

    /// Set the effect distribution.
    #[must_use]
    pub const fn distribution(mut self, distribution: Distribution) -> Self {
        self.distribution = Some(distribution);
        self
    }

    /// Set the signal strength `L`.
    #[must_use]
    pub const fn signal_strength(mut self, signal_strength: f64) -> Self {
        self.signal_strength = Some(signal_strength);
        self
    }

    /// Set the significance level.
    #[must_use]
    pub const fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }

    /// Set the number of replications.
    #[must_use]
    pub const fn n_reps(mut self, n_reps: usize) -> Self {
        self.n_reps = Some(n_reps);
        self
    }

    /// Set the master seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first offending field.
    pub fn build(self) -> SimResult<SimulationConfig> {
        let m = self
            .m
            .ok_or_else(|| SimError::config("m", "total hypothesis count is required"))?;
        let m0 = self
            .m0
            .ok_or_else(|| SimError::config("m0", "true-null count is required"))?;
        let distribution = self
            .distribution
            .ok_or_else(|| SimError::config("distribution", "distribution is required"))?;

        let config = SimulationConfig {
            m,
            m0,
            m1: m.saturating_sub(m0),
            distribution,
            signal_strength: self.signal_strength.unwrap_or(DEFAULT_SIGNAL_STRENGTH),
            alpha: self.alpha.unwrap_or(DEFAULT_ALPHA),
            n_reps: self.n_reps.unwrap_or(DEFAULT_N_REPS),
            seed: self.seed.unwrap_or(DEFAULT_SEED),
        };
        validate_simulation_config(&config)?;
        Ok(config)
    }
}

fn validate_simulation_config(config: &SimulationConfig) -> SimResult<()> {
    if config.m == 0 {
        return Err(SimError::config("m", "must be at least 1"));
    }
    if config.m0 > config.m {
        return Err(SimError::config(
            "m0",
            format!("must lie in [0, {}], got {}", config.m, config.m0),
        ));
    }
    if !(config.signal_strength.is_finite() && config.signal_strength > 0.0) {
        return Err(SimError::config(
            "signal_strength",
            format!("must be positive and finite, got {}", config.signal_strength),
        ));
    }
    if !(config.alpha > 0.0 && config.alpha < 1.0) {
        return Err(SimError::config(
            "alpha",
            format!("must lie in (0, 1), got {}", config.alpha),
        ));
    }
    if config.n_reps == 0 {
        return Err(SimError::config("n_reps", "must be at least 1"));
    }
    Ok(())
}

/// Wire form of [`SimulationConfig`], validated on conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SimulationConfigSpec {
    m: usize,
    m0: usize,
    #[serde(default)]
    m1: Option<usize>,
    distribution: Distribution,
    #[serde(default = "default_signal_strength", alias = "L")]
    signal_strength: f64,
    #[serde(default = "default_alpha")]
    alpha: f64,
    #[serde(default = "default_n_reps")]
    n_reps: usize,
    #[serde(default = "default_seed")]
    seed: u64,
}

impl TryFrom<SimulationConfigSpec> for SimulationConfig {
    type Error = SimError;

    fn try_from(spec: SimulationConfigSpec) -> Result<Self, Self::Error> {
        let config = SimulationConfigBuilder {
            m: Some(spec.m),
            m0: Some(spec.m0),
            distribution: Some(spec.distribution),
            signal_strength: Some(spec.signal_strength),
            alpha: Some(spec.alpha),
            n_reps: Some(spec.n_reps),
            seed: Some(spec.seed),
        }
        .build()?;

        match spec.m1 {
            Some(m1) if m1 != config.m1 => Err(SimError::config(
                "m1",
                format!("m0 + m1 must equal m ({} + {m1} != {})", config.m0, config.m),
            )),
            _ => Ok(config),
        }
    }
}

impl From<SimulationConfig> for SimulationConfigSpec {
    fn from(config: SimulationConfig) -> Self {
        Self {
            m: config.m,
            m0: config.m0,
            m1: Some(config.m1),
            distribution: config.distribution,
            signal_strength: config.signal_strength,
            alpha: config.alpha,
            n_reps: config.n_reps,
            seed: config.seed,
        }
    }
}

const fn default_signal_strength() -> f64 {
    DEFAULT_SIGNAL_STRENGTH
}

const fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

const fn default_n_reps() -> usize {
    DEFAULT_N_REPS
}

const fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_m_values() -> Vec<usize> {
    vec![4, 8, 16, 32, 64]
}

fn default_null_proportions() -> Vec<f64> {
    vec![0.0, 0.25, 0.5, 0.75]
}

fn default_distributions() -> Vec<Distribution> {
    Distribution::ALL.to_vec()
}

/// A full factorial study: every `m` × null proportion × distribution.
///
/// Loaded from YAML with full schema validation:
///
/// ```yaml
/// m_values: [4, 8, 16, 32, 64]
/// null_proportions: [0.0, 0.25, 0.5, 0.75]
/// distributions: [D, E, I]
/// signal_strength: 5.0
/// alpha: 0.05
/// n_reps: 20000
/// seed: 12345
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StudyConfig {
    /// Hypothesis counts to simulate.
    #[validate(length(min = 1))]
    #[serde(default = "default_m_values")]
    pub m_values: Vec<usize>,
    /// Proportions of true nulls; `m0 = floor(m * p)`.
    #[validate(length(min = 1))]
    #[serde(default = "default_null_proportions")]
    pub null_proportions: Vec<f64>,
    /// Effect distributions.
    #[validate(length(min = 1))]
    #[serde(default = "default_distributions")]
    pub distributions: Vec<Distribution>,
    /// Signal strength `L`.
    #[validate(range(exclusive_min = 0.0))]
    #[serde(default = "default_signal_strength", alias = "L")]
    pub signal_strength: f64,
    /// Significance level.
    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Replications per configuration.
    #[validate(range(min = 1))]
    #[serde(default = "default_n_reps")]
    pub n_reps: usize,
    /// Master seed shared by every configuration.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Worker threads for the replication loop; sequential when unset.
    #[validate(range(min = 1))]
    #[serde(default)]
    pub parallel_workers: Option<usize>,
    /// Where `run` stores results when no `--out` is given.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            m_values: default_m_values(),
            null_proportions: default_null_proportions(),
            distributions: default_distributions(),
            signal_strength: DEFAULT_SIGNAL_STRENGTH,
            alpha: DEFAULT_ALPHA,
            n_reps: DEFAULT_N_REPS,
            seed: DEFAULT_SEED,
            parallel_workers: None,
            output_dir: None,
        }
    }
}

impl StudyConfig {
    /// Load a study from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - YAML parsing fails
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a study from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns error if parsing or validation fails.
    pub fn from_yaml(yaml: &str) -> SimResult<Self> {
        let study: Self = serde_yaml::from_str(yaml)?;
        study.validate()?;
        study.validate_semantic()?;
        study.configs()?;
        Ok(study)
    }

    /// Validate constraints the schema cannot express.
    fn validate_semantic(&self) -> SimResult<()> {
        if let Some(m) = self.m_values.iter().find(|&&m| m == 0) {
            return Err(SimError::config(
                "m_values",
                format!("every m must be at least 1, got {m}"),
            ));
        }
        if let Some(p) = self
            .null_proportions
            .iter()
            .find(|p| !(p.is_finite() && (0.0..=1.0).contains(*p)))
        {
            return Err(SimError::config(
                "null_proportions",
                format!("every proportion must lie in [0, 1], got {p}"),
            ));
        }
        if !self.signal_strength.is_finite() {
            return Err(SimError::config("signal_strength", "must be finite"));
        }
        Ok(())
    }

    /// Expand the study into its simulation configurations, ordered by `m`,
    /// then null proportion, then distribution.
    ///
    /// Every grid point must map to a distinct [`ResultKey`]. Two null
    /// proportions that floor to the same `m0` for some `m` are rejected.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any grid point is invalid or two
    /// grid points share a key.
    pub fn configs(&self) -> SimResult<Vec<SimulationConfig>> {
        let mut configs =
            Vec::with_capacity(self.m_values.len() * self.null_proportions.len() * self.distributions.len());
        let mut seen: BTreeMap<ResultKey, f64> = BTreeMap::new();
        for &m in &self.m_values {
            for &proportion in &self.null_proportions {
                let m0 = (m as f64 * proportion).floor() as usize;
                for &distribution in &self.distributions {
                    let config = SimulationConfig::builder()
                        .m(m)
                        .m0(m0)
                        .distribution(distribution)
                        .signal_strength(self.signal_strength)
                        .alpha(self.alpha)
                        .n_reps(self.n_reps)
                        .seed(self.seed)
                        .build()?;
                    if let Some(earlier) = seen.insert(config.key(), proportion) {
                        return Err(duplicate_key_error(config.key(), earlier, proportion));
                    }
                    configs.push(config);
                }
            }
        }
        Ok(configs)
    }
}

fn duplicate_key_error(key: ResultKey, earlier: f64, proportion: f64) -> SimError {
    if earlier.to_bits() == proportion.to_bits() {
        SimError::config("grid", format!("configuration {key} is listed more than once"))
    } else {
        SimError::config(
            "null_proportions",
            format!(
                "proportions {earlier} and {proportion} both give m0 = {} for m = {}",
                key.m0, key.m
            ),
        )
    }
}
