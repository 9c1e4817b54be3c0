//! Optimizer configuration.
//!
//! Handles loading, validating, and merging `blob-squeeze.toml`. Stock
//! defaults are overridden by whatever the user file sets; CLI flags then
//! override individual values per invocation.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [compression]
//! quality = 75              # JPEG quality (1-100)
//! max_dimension = 0         # Bound on the longer side; 0 = never resize
//! filter = "bilinear"       # nearest | bilinear | lanczos3
//!
//! [decode]
//! max_source_bytes = 52428800  # Reject uploads larger than this
//! max_side = 16384             # Reject images wider or taller than this
//!
//! [store]
//! root = "blobs"            # Filesystem blob store directory
//!
//! [processing]
//! max_processes = 4         # Batch workers (omit for auto = CPU cores)
//! timeout_secs = 30         # Per-image deadline (omit for none)
//! ```
//!
//! Config files are sparse: override just the values you want. Unknown keys
//! are rejected to catch typos early.

use crate::imaging::decode::{DEFAULT_MAX_SIDE, DEFAULT_MAX_SOURCE_BYTES};
use crate::imaging::encode::QUALITY_RANGE;
use crate::imaging::{DEFAULT_QUALITY, ResampleFilter};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "blob-squeeze.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Top-level configuration. Every section has defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    pub compression: CompressionConfig,
    pub decode: DecodeConfig,
    pub store: StoreConfig,
    pub processing: ProcessingConfig,
}

impl OptimizerConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !QUALITY_RANGE.contains(&self.compression.quality) {
            return Err(ConfigError::Validation(
                "compression.quality must be 1-100".into(),
            ));
        }
        if self.decode.max_source_bytes == 0 {
            return Err(ConfigError::Validation(
                "decode.max_source_bytes must be non-zero".into(),
            ));
        }
        if self.decode.max_side == 0 {
            return Err(ConfigError::Validation(
                "decode.max_side must be non-zero".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        if self.processing.timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "processing.timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Output encoding settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionConfig {
    /// JPEG quality (1 = worst, 100 = best).
    pub quality: i32,
    /// Longest allowed output side in pixels; 0 keeps the source size.
    pub max_dimension: u32,
    /// Resampling filter used when an image is downscaled.
    pub filter: ResampleFilter,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            max_dimension: 0,
            filter: ResampleFilter::default(),
        }
    }
}

/// Input limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecodeConfig {
    /// Uploads larger than this many bytes are rejected before decoding.
    pub max_source_bytes: u64,
    /// Images wider or taller than this many pixels are rejected before
    /// their pixel buffer is allocated.
    pub max_side: u32,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            max_side: DEFAULT_MAX_SIDE,
        }
    }
}

/// Filesystem blob store location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("blobs"),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel batch workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
    /// Per-image deadline covering the source read and the store write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ProcessingConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Stock defaults as a TOML value, the base layer for merging.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(OptimizerConfig::default())
        .unwrap_or_else(|_| toml::Value::Table(Default::default()))
}

/// Recursively merge `overlay` onto `base`. Tables merge key by key; any
/// other overlay value replaces the base value outright.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            toml::Value::Table(base)
        }
        (_, overlay) => overlay,
    }
}

/// Parse a config file into a raw TOML value (not yet merged or validated).
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge an optional overlay onto stock defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<OptimizerConfig, ConfigError> {
    let base = stock_defaults_value();
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: OptimizerConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration.
///
/// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_FILE`] in the
/// working directory is used if present, and stock defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<OptimizerConfig, ConfigError> {
    let overlay = match path {
        Some(p) => Some(load_raw_config(p)?),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.exists() {
                Some(load_raw_config(default)?)
            } else {
                None
            }
        }
    };
    resolve_config(overlay)
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# blob-squeeze configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Command-line flags (--quality, --max-dimension, --filter, --store)
# override these values for a single run.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Output encoding
# ---------------------------------------------------------------------------
[compression]
# JPEG quality (1 = worst, 100 = best). 75 is heavily compressed but not
# visibly so.
quality = 75

# Bound on the longer side of the output, in pixels. Images that already fit
# are re-encoded at their original size. 0 disables resizing entirely.
max_dimension = 0

# Resampling filter for downscaled images:
#   "nearest"  - fastest, blocky
#   "bilinear" - fast, smooth (default)
#   "lanczos3" - sharpest, slowest on large reductions
filter = "bilinear"

# ---------------------------------------------------------------------------
# Input limits
# ---------------------------------------------------------------------------
[decode]
# Uploads larger than this many bytes are rejected without decoding.
max_source_bytes = 52428800
# Images wider or taller than this many pixels are rejected before decoding
# their pixel data.
max_side = 16384

# ---------------------------------------------------------------------------
# Blob store
# ---------------------------------------------------------------------------
[store]
# Directory of the content-addressed filesystem store used by `put` and
# `replace`.
root = "blobs"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for `batch`.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# Deadline per image, covering the source read and the store write.
# Omit for no deadline.
# timeout_secs = 30
"##
}
