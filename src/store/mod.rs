//! Blob store collaborator contract and the commit sequence run against it.
//!
//! The pipeline never talks to a concrete storage service. It depends on the
//! [`BlobStore`] trait, which is the minimal capability set every backing
//! store (an object storage service, a directory on disk, a map in memory)
//! can offer:
//!
//! | Operation | Purpose |
//! |---|---|
//! | `open_for_write` | start a staged, invisible write |
//! | `write` | append bytes to the staged write |
//! | `finalize` | publish the staged bytes, yielding a [`Published`] ref |
//! | `abort` | discard a staged write that will never be finalized |
//! | `stat` | canonical metadata for a published blob |
//! | `open_for_read` | stream a published blob |
//! | `delete` | remove a published blob |
//!
//! Two implementations ship with the crate: [`FsBlobStore`] (content
//! addressed, on disk) and [`MemoryBlobStore`] (for tests and embedding).
//! [`commit`] is the only code that drives the write half of the contract.

mod fs;
mod memory;
mod reconcile;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use reconcile::{CommitStage, commit};

#[cfg(test)]
pub(crate) use reconcile::tests::FaultyStore;

use crate::imaging::Cancelled;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("Blob not found: {0}")]
    NotFound(BlobRef),
    #[error("Write handle already finalized")]
    HandleClosed,
    #[error("Store {stage} failed: {source}")]
    Commit {
        stage: CommitStage,
        #[source]
        source: Box<StoreError>,
    },
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl StoreError {
    /// True if this error (or the one it wraps) was a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            StoreError::Cancelled(_) => true,
            StoreError::Commit { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Opaque identifier for a published blob.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(String);

impl BlobRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-provided facts about a published blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub content_type: String,
    pub size: u64,
    /// SHA-256 of the stored bytes, lowercase hex.
    pub sha256: String,
}

/// Result of a successful `finalize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub blob: BlobRef,
    /// False when the store already held an identical object under this ref
    /// (content-addressed stores deduplicate). Such an object is not owned by
    /// the caller and must not be cleaned up on its behalf.
    pub created: bool,
}

/// A committed blob: its reference plus the metadata the store reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub blob: BlobRef,
    pub metadata: BlobMetadata,
}

/// Minimal capability set the pipeline needs from a backing store.
///
/// Writes are staged: nothing written through a handle is visible to
/// `stat`, `open_for_read`, or any other reader until `finalize` succeeds.
/// A handle whose `finalize` failed must still be passed to `abort`.
pub trait BlobStore: Send + Sync {
    type Handle;

    fn open_for_write(&self, content_type: &str) -> Result<Self::Handle, StoreError>;

    fn write(&self, handle: &mut Self::Handle, bytes: &[u8]) -> Result<(), StoreError>;

    /// Publish the staged bytes. On error nothing is published and no
    /// existing object is modified.
    fn finalize(&self, handle: &mut Self::Handle) -> Result<Published, StoreError>;

    /// Discard a staged write. Never fails; cleanup is best effort.
    fn abort(&self, handle: Self::Handle);

    fn stat(&self, blob: &BlobRef) -> Result<BlobMetadata, StoreError>;

    fn open_for_read(&self, blob: &BlobRef) -> Result<Box<dyn Read + Send>, StoreError>;

    fn delete(&self, blob: &BlobRef) -> Result<(), StoreError>;
}

/// Lowercase hex digest of a finished SHA-256 hasher.
pub(crate) fn sha256_hex(hasher: sha2::Sha256) -> String {
    use sha2::Digest;
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_ref_serializes_as_plain_string() {
        let json = serde_json::to_string(&BlobRef::new("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }

    #[test]
    fn commit_error_names_the_stage() {
        let err = StoreError::Commit {
            stage: CommitStage::Finalize,
            source: Box::new(StoreError::HandleClosed),
        };
        assert_eq!(
            err.to_string(),
            "Store finalize failed: Write handle already finalized"
        );
    }

    #[test]
    fn cancellation_is_seen_through_commit_wrapper() {
        let err = StoreError::Commit {
            stage: CommitStage::Write,
            source: Box::new(StoreError::Cancelled(Cancelled)),
        };
        assert!(err.is_cancelled());
        assert!(!StoreError::HandleClosed.is_cancelled());
    }
}
