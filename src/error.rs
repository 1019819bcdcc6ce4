//! Error types for fdrsim.
//!
//! Every fallible operation returns `Result<T, SimError>`; nothing in the
//! library panics on bad input.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for fdrsim operations.
pub type SimResult<T> = Result<T, SimError>;

/// Unified error type for all fdrsim operations.
///
/// Configuration and shape errors are raised before any replication runs,
/// so a failed call never yields a partial result.
#[derive(Debug, Error)]
pub enum SimError {
    // ===== Configuration Errors =====
    /// Invalid configuration parameter.
    #[error("Configuration error in '{field}': {message}")]
    Config {
        /// Name of the offending field.
        field: String,
        /// Description of the configuration error.
        message: String,
    },

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    // ===== Engine Errors =====
    /// Supplied noise matrix or row disagrees with the configuration.
    #[error("Shape mismatch: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    ShapeMismatch {
        /// Rows required by the configuration (`n_reps`).
        expected_rows: usize,
        /// Columns required by the configuration (`m`).
        expected_cols: usize,
        /// Rows supplied.
        rows: usize,
        /// Columns supplied.
        cols: usize,
    },

    /// Supplied noise matrix was generated from a different seed.
    #[error("Seed mismatch: config seed {expected}, noise generated from {found}")]
    SeedMismatch {
        /// Seed of the configuration.
        expected: u64,
        /// Seed stamped on the noise matrix.
        found: u64,
    },

    // ===== Store Errors =====
    /// Stored result failed its integrity check.
    #[error("Store integrity violation: hash mismatch in {}", path.display())]
    StoreIntegrity {
        /// File that failed verification.
        path: PathBuf,
    },

    /// No stored results were found.
    #[error("No simulation results found in {}", dir.display())]
    NoResults {
        /// Directory that was scanned.
        dir: PathBuf,
    },

    // ===== I/O Errors =====
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SimError {
    /// Create a configuration error naming the offending field.
    #[must_use]
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Check if this error was raised while validating inputs, before any
    /// replication ran.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::YamlParse(_)
                | Self::Validation(_)
                | Self::ShapeMismatch { .. }
                | Self::SeedMismatch { .. }
        )
    }
}

impl From<bincode::Error> for SimError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
