//! Per-invocation compression parameters.
//!
//! These describe *what* the caller wants for one asset. Process-wide
//! settings (resample filter, source size cap) live on the
//! [`Optimizer`](crate::pipeline::Optimizer) instead.

use serde::{Deserialize, Serialize};

/// Default JPEG quality: heavily compressed but not visibly so.
pub const DEFAULT_QUALITY: i32 = 75;

/// What to do with one uploaded image.
///
/// - `mime_type`: the type the uploader declared; checked by the format gate.
/// - `quality`: JPEG quality, handed to the encoder unmodified.
/// - `max_dimension`: bound on the longer output side; 0 disables resizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionParams {
    pub mime_type: String,
    pub quality: i32,
    pub max_dimension: u32,
}

impl CompressionParams {
    pub fn new(mime_type: impl Into<String>, quality: i32, max_dimension: u32) -> Self {
        Self {
            mime_type: mime_type.into(),
            quality,
            max_dimension,
        }
    }

    /// Default quality, no resize.
    pub fn with_defaults(mime_type: impl Into<String>) -> Self {
        Self::new(mime_type, DEFAULT_QUALITY, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_size_and_use_75() {
        let p = CompressionParams::with_defaults("image/png");
        assert_eq!(p.mime_type, "image/png");
        assert_eq!(p.quality, 75);
        assert_eq!(p.max_dimension, 0);
    }

    #[test]
    fn quality_is_not_clamped() {
        assert_eq!(CompressionParams::new("image/gif", 250, 10).quality, 250);
    }
}
