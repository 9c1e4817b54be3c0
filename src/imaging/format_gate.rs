//! Declared content-type validation.
//!
//! The gate runs before a single byte of the upload is read, so rejected
//! uploads cost no I/O. It only looks at the *declared* type; the decoder
//! sniffs the real format later and is free to disagree.

use thiserror::Error;

/// Mime types accepted for decoding. Output is always JPEG regardless.
const ACCEPTED_MIME_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/gif"];

/// File extensions mapped to the mime type a browser would declare for them.
const EXTENSION_MIME_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported mime-type: {mime_type}")]
pub struct UnsupportedFormat {
    pub mime_type: String,
}

/// Validates declared mime types against a fixed accepted set.
///
/// The set is owned by the instance and never changes after construction.
#[derive(Debug, Clone)]
pub struct FormatGate {
    accepted: Vec<String>,
}

impl FormatGate {
    pub fn new() -> Self {
        Self {
            accepted: ACCEPTED_MIME_TYPES.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Accept `mime_type` if it names a decodable format.
    ///
    /// Matching is case-insensitive and ignores media-type parameters, so
    /// `Image/PNG; charset=binary` passes.
    pub fn validate(&self, mime_type: &str) -> Result<(), UnsupportedFormat> {
        let essence = essence(mime_type);
        if self.accepted.iter().any(|m| m.eq_ignore_ascii_case(essence)) {
            Ok(())
        } else {
            Err(UnsupportedFormat {
                mime_type: mime_type.to_string(),
            })
        }
    }

    pub fn accepted(&self) -> &[String] {
        &self.accepted
    }
}

impl Default for FormatGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip parameters and whitespace: `" image/png ; q=1"` → `"image/png"`.
fn essence(mime_type: &str) -> &str {
    mime_type.split(';').next().unwrap_or("").trim()
}

/// Mime type a client would declare for a file with this extension.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    EXTENSION_MIME_TYPES
        .iter()
        .find(|(e, _)| e.eq_ignore_ascii_case(ext))
        .map(|(_, mime)| *mime)
}

/// Every extension [`mime_for_extension`] recognizes.
pub fn supported_extensions() -> impl Iterator<Item = &'static str> {
    EXTENSION_MIME_TYPES.iter().map(|(ext, _)| *ext)
}
