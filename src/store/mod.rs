//! On-disk store for simulation results.
//!
//! One file per `(m, m0, distribution)` key, named
//! `sim_m{m}_m0{m0}_{D|E|I}.fdrsim`. Each file is a bincode-encoded
//! [`StoredResult`] envelope:
//!
//! ```text
//! format_version | producer | blake3(payload) | payload = zstd(bincode(SimulationResult))
//! ```
//!
//! The hash is verified before decompression, so a truncated or edited
//! payload is reported as `StoreIntegrity` rather than as garbage data.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ResultKey;
use crate::engine::SimulationResult;
use crate::error::{SimError, SimResult};

/// Current envelope version.
pub const FORMAT_VERSION: u32 = 1;

/// File extension of stored results.
pub const EXTENSION: &str = "fdrsim";

const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Envelope written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredResult {
    format_version: u32,
    producer: String,
    hash: [u8; 32],
    payload: Vec<u8>,
}

impl StoredResult {
    fn seal(result: &SimulationResult, compression_level: i32) -> SimResult<Self> {
        let serialized = bincode::serialize(result)?;
        let payload = zstd::encode_all(&serialized[..], compression_level)?;
        let hash = blake3::hash(&payload);
        Ok(Self {
            format_version: FORMAT_VERSION,
            producer: producer(),
            hash: *hash.as_bytes(),
            payload,
        })
    }

    fn open(&self, path: &Path) -> SimResult<SimulationResult> {
        if self.format_version != FORMAT_VERSION {
            return Err(SimError::serialization(format!(
                "{}: unsupported format version {} (expected {FORMAT_VERSION})",
                path.display(),
                self.format_version
            )));
        }
        if blake3::hash(&self.payload).as_bytes() != &self.hash {
            return Err(SimError::StoreIntegrity {
                path: path.to_path_buf(),
            });
        }
        let decompressed = zstd::decode_all(&self.payload[..])?;
        Ok(bincode::deserialize(&decompressed)?)
    }
}

fn producer() -> String {
    format!("fdrsim {}", env!("FDRSIM_VERSION"))
}

/// File name for `key`.
#[must_use]
pub fn file_name(key: &ResultKey) -> String {
    format!(
        "sim_m{}_m0{}_{}.{EXTENSION}",
        key.m,
        key.m0,
        key.distribution.code()
    )
}

/// Directory of stored simulation results.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
    compression_level: i32,
}

impl ResultStore {
    /// Store rooted at `dir`; the directory is created on first save.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Override the zstd compression level.
    #[must_use]
    pub const fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`.
    #[must_use]
    pub fn path_for(&self, key: &ResultKey) -> PathBuf {
        self.dir.join(file_name(key))
    }

    /// Write `result`, replacing any earlier file for the same key.
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Serialization` errors.
    pub fn save(&self, result: &SimulationResult) -> SimResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let stored = StoredResult::seal(result, self.compression_level)?;
        let bytes = bincode::serialize(&stored)?;

        let path = self.path_for(&result.key());
        let staging = path.with_extension(format!("{EXTENSION}.tmp"));
        if let Err(err) = fs::write(&staging, &bytes).and_then(|()| fs::rename(&staging, &path)) {
            // Best effort; report the write or rename error.
            let _ = fs::remove_file(&staging);
            return Err(err.into());
        }

        debug!(key = %result.key(), path = %path.display(), bytes = bytes.len(), "Saved result");
        Ok(path)
    }

    /// Load the result stored for `key`.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file is missing, `StoreIntegrity` on a hash
    /// mismatch, `Serialization` on a malformed file.
    pub fn load(&self, key: &ResultKey) -> SimResult<SimulationResult> {
        self.load_path(self.path_for(key))
    }

    /// Load and verify one result file.
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn load_path<P: AsRef<Path>>(&self, path: P) -> SimResult<SimulationResult> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let stored: StoredResult = bincode::deserialize(&bytes)
            .map_err(|e| SimError::serialization(format!("{}: {e}", path.display())))?;
        stored.open(path)
    }

    /// Result files in the directory, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory cannot be read.
    pub fn list(&self) -> SimResult<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_result = path.extension().is_some_and(|ext| ext == EXTENSION)
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("sim_"));
            if is_result && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Load every stored result, keyed by configuration.
    ///
    /// # Errors
    ///
    /// Returns `NoResults` if the directory is missing or holds no result
    /// files; otherwise the first error from [`Self::load_path`].
    pub fn load_all(&self) -> SimResult<BTreeMap<ResultKey, SimulationResult>> {
        if !self.dir.is_dir() {
            return Err(SimError::NoResults {
                dir: self.dir.clone(),
            });
        }

        let mut results = BTreeMap::new();
        for path in self.list()? {
            let result = self.load_path(&path)?;
            results.insert(result.key(), result);
        }

        if results.is_empty() {
            return Err(SimError::NoResults {
                dir: self.dir.clone(),
            });
        }
        info!(count = results.len(), dir = %self.dir.display(), "Loaded stored results");
        Ok(results)
    }
}
