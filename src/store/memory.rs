//! In-process blob store.
//!
//! Staged bytes live in the write handle itself, so an aborted or dropped
//! handle leaves no trace. Published blobs sit behind a `Mutex`, which keeps
//! the store `Sync` for parallel batch runs.

use super::{BlobMetadata, BlobRef, BlobStore, Published, StoreError, sha256_hex};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    blobs: BTreeMap<BlobRef, (BlobMetadata, Vec<u8>)>,
}

/// Blob store backed by a map in memory. Refs are `mem-1`, `mem-2`, …
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    inner: Mutex<Inner>,
}

/// Staged write for [`MemoryBlobStore`].
#[derive(Debug)]
pub struct MemoryWriteHandle {
    content_type: String,
    buf: Vec<u8>,
    finalized: bool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish `bytes` directly, bypassing the staged-write protocol.
    pub fn insert(&self, content_type: &str, bytes: Vec<u8>) -> BlobRef {
        let mut inner = self.lock();
        inner.next_id += 1;
        let blob = BlobRef::new(format!("mem-{}", inner.next_id));
        let metadata = BlobMetadata {
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
            sha256: sha256_hex(Sha256::new_with_prefix(&bytes)),
        };
        inner.blobs.insert(blob.clone(), (metadata, bytes));
        blob
    }

    /// Bytes of a published blob.
    pub fn get(&self, blob: &BlobRef) -> Option<Vec<u8>> {
        self.lock().blobs.get(blob).map(|(_, bytes)| bytes.clone())
    }

    pub fn refs(&self) -> Vec<BlobRef> {
        self.lock().blobs.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    type Handle = MemoryWriteHandle;

    fn open_for_write(&self, content_type: &str) -> Result<Self::Handle, StoreError> {
        Ok(MemoryWriteHandle {
            content_type: content_type.to_string(),
            buf: Vec::new(),
            finalized: false,
        })
    }

    fn write(&self, handle: &mut Self::Handle, bytes: &[u8]) -> Result<(), StoreError> {
        if handle.finalized {
            return Err(StoreError::HandleClosed);
        }
        handle.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn finalize(&self, handle: &mut Self::Handle) -> Result<Published, StoreError> {
        if handle.finalized {
            return Err(StoreError::HandleClosed);
        }
        handle.finalized = true;
        Ok(Published {
            blob: self.insert(&handle.content_type, std::mem::take(&mut handle.buf)),
            created: true,
        })
    }

    fn abort(&self, handle: Self::Handle) {
        drop(handle);
    }

    fn stat(&self, blob: &BlobRef) -> Result<BlobMetadata, StoreError> {
        self.lock()
            .blobs
            .get(blob)
            .map(|(metadata, _)| metadata.clone())
            .ok_or_else(|| StoreError::NotFound(blob.clone()))
    }

    fn open_for_read(&self, blob: &BlobRef) -> Result<Box<dyn Read + Send>, StoreError> {
        let bytes = self
            .get(blob)
            .ok_or_else(|| StoreError::NotFound(blob.clone()))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn delete(&self, blob: &BlobRef) -> Result<(), StoreError> {
        self.lock()
            .blobs
            .remove(blob)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(blob.clone()))
    }
}
