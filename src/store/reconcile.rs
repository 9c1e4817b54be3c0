//! Store reconciler: open → write → finalize → stat, with cleanup.
//!
//! Whatever step fails, no partially committed blob stays visible:
//!
//! | Failing step | Cleanup before the error propagates |
//! |---|---|
//! | open | none (nothing staged) |
//! | write / cancel | `abort` the handle |
//! | finalize | `abort` the handle |
//! | stat | `delete` the blob, if this commit created it |
//!
//! A content-addressed store may answer `finalize` with an object that was
//! already published by someone else. That object is never deleted here.
//!
//! Removing the blob being replaced is not part of this sequence; callers do
//! that as a separate step once `commit` has returned.

use super::{BlobStore, StoreError, StoredObject};
use crate::imaging::CancelToken;
use std::fmt;
use tracing::{debug, warn};

/// Bytes handed to `BlobStore::write` per call.
const WRITE_CHUNK: usize = 64 * 1024;

/// Step of the commit sequence an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStage {
    Open,
    Write,
    Finalize,
    Stat,
}

impl fmt::Display for CommitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommitStage::Open => "open",
            CommitStage::Write => "write",
            CommitStage::Finalize => "finalize",
            CommitStage::Stat => "stat",
        })
    }
}

impl StoreError {
    fn at(self, stage: CommitStage) -> Self {
        match self {
            StoreError::Cancelled(_) => self,
            other => StoreError::Commit {
                stage,
                source: Box::new(other),
            },
        }
    }
}

/// Publish `bytes` as a new blob and return its reference and metadata.
pub fn commit<S: BlobStore + ?Sized>(
    store: &S,
    bytes: &[u8],
    content_type: &str,
    cancel: &CancelToken,
) -> Result<StoredObject, StoreError> {
    let mut handle = store
        .open_for_write(content_type)
        .map_err(|e| e.at(CommitStage::Open))?;

    for chunk in bytes.chunks(WRITE_CHUNK) {
        let written = cancel
            .check()
            .map_err(StoreError::from)
            .and_then(|()| store.write(&mut handle, chunk));
        if let Err(e) = written {
            store.abort(handle);
            return Err(e.at(CommitStage::Write));
        }
    }
    if let Err(e) = cancel.check() {
        store.abort(handle);
        return Err(e.into());
    }

    let published = match store.finalize(&mut handle) {
        Ok(published) => published,
        Err(e) => {
            store.abort(handle);
            return Err(e.at(CommitStage::Finalize));
        }
    };
    drop(handle);
    let blob = published.blob;

    match store.stat(&blob) {
        Ok(metadata) => {
            debug!(
                blob = %blob,
                size = metadata.size,
                created = published.created,
                "committed blob"
            );
            Ok(StoredObject { blob, metadata })
        }
        Err(e) => {
            if published.created {
                if let Err(cleanup) = store.delete(&blob) {
                    warn!(blob = %blob, error = %cleanup, "failed to remove unstat-able blob");
                }
            } else {
                warn!(blob = %blob, "stat failed on pre-existing blob; leaving it in place");
            }
            Err(e.at(CommitStage::Stat))
        }
    }
}
