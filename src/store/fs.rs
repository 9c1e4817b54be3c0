//! Content-addressed blob store on the local filesystem.
//!
//! ```text
//! <root>/
//! ├── staging/          # NamedTempFile per open write handle
//! └── objects/
//!     ├── <sha256>       # published bytes
//!     └── <sha256>.json  # BlobMetadata sidecar
//! ```
//!
//! A blob is visible once `objects/<sha256>` exists. Publishing renames the
//! staged temp file into place, which is atomic on a single filesystem, so
//! readers never observe a half-written object. The metadata sidecar is
//! published first and removed again if the rename fails.
//!
//! Identical bytes map to the same ref. Finalizing bytes that are already
//! published discards the staged copy and leaves the existing object and its
//! sidecar untouched, reporting `created: false`.

use super::{BlobMetadata, BlobRef, BlobStore, Published, StoreError, sha256_hex};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const STAGING_DIR: &str = "staging";
const OBJECTS_DIR: &str = "objects";

/// Blob store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

/// Staged write for [`FsBlobStore`]. Dropping it deletes the staged file.
#[derive(Debug)]
pub struct FsWriteHandle {
    file: Option<NamedTempFile>,
    hasher: Sha256,
    size: u64,
    content_type: String,
}

impl FsBlobStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join(STAGING_DIR))?;
        fs::create_dir_all(root.join(OBJECTS_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a blob's bytes. Refs that are not SHA-256 hex never resolve,
    /// which also keeps `../` and friends out of the objects directory.
    fn object_path(&self, blob: &BlobRef) -> Result<PathBuf, StoreError> {
        let id = blob.as_str();
        if id.len() == 64 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            Ok(self.root.join(OBJECTS_DIR).join(id))
        } else {
            Err(StoreError::NotFound(blob.clone()))
        }
    }

    fn metadata_path(object_path: &Path) -> PathBuf {
        object_path.with_extension("json")
    }
}

impl BlobStore for FsBlobStore {
    type Handle = FsWriteHandle;

    fn open_for_write(&self, content_type: &str) -> Result<Self::Handle, StoreError> {
        let file = NamedTempFile::new_in(self.root.join(STAGING_DIR))?;
        debug!(path = %file.path().display(), "staging blob");
        Ok(FsWriteHandle {
            file: Some(file),
            hasher: Sha256::new(),
            size: 0,
            content_type: content_type.to_string(),
        })
    }

    fn write(&self, handle: &mut Self::Handle, bytes: &[u8]) -> Result<(), StoreError> {
        let file = handle.file.as_mut().ok_or(StoreError::HandleClosed)?;
        file.write_all(bytes)?;
        handle.hasher.update(bytes);
        handle.size += bytes.len() as u64;
        Ok(())
    }

    fn finalize(&self, handle: &mut Self::Handle) -> Result<Published, StoreError> {
        let staged = handle.file.as_ref().ok_or(StoreError::HandleClosed)?;
        staged.as_file().sync_all()?;

        let digest = sha256_hex(handle.hasher.clone());
        let blob = BlobRef::new(digest.clone());
        let object_path = self.object_path(&blob)?;

        if object_path.is_file() {
            // Same bytes are already published; the existing object and its
            // sidecar stay exactly as they are.
            if let Some(file) = handle.file.take()
                && let Err(e) = file.close()
            {
                debug!(error = %e, "failed to remove staged duplicate");
            }
            debug!(blob = %blob, "blob already published");
            return Ok(Published {
                blob,
                created: false,
            });
        }

        let metadata_path = Self::metadata_path(&object_path);
        let metadata = BlobMetadata {
            content_type: handle.content_type.clone(),
            size: handle.size,
            sha256: digest,
        };
        let mut sidecar = NamedTempFile::new_in(self.root.join(STAGING_DIR))?;
        serde_json::to_writer_pretty(&mut sidecar, &metadata)?;
        sidecar.persist(&metadata_path).map_err(|e| e.error)?;

        let Some(file) = handle.file.take() else {
            return Err(StoreError::HandleClosed);
        };
        if let Err(e) = file.persist(&object_path) {
            // Give the temp file back so abort() can remove it.
            handle.file = Some(e.file);
            let _ = fs::remove_file(&metadata_path);
            return Err(e.error.into());
        }
        debug!(blob = %blob, size = metadata.size, "published blob");
        Ok(Published {
            blob,
            created: true,
        })
    }

    fn abort(&self, handle: Self::Handle) {
        if let Some(file) = handle.file
            && let Err(e) = file.close()
        {
            debug!(error = %e, "failed to remove staged blob");
        }
    }

    fn stat(&self, blob: &BlobRef) -> Result<BlobMetadata, StoreError> {
        let object_path = self.object_path(blob)?;
        if !object_path.is_file() {
            return Err(StoreError::NotFound(blob.clone()));
        }
        let sidecar = File::open(Self::metadata_path(&object_path))?;
        Ok(serde_json::from_reader(BufReader::new(sidecar))?)
    }

    fn open_for_read(&self, blob: &BlobRef) -> Result<Box<dyn Read + Send>, StoreError> {
        let object_path = self.object_path(blob)?;
        match File::open(&object_path) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(blob.clone())),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, blob: &BlobRef) -> Result<(), StoreError> {
        let object_path = self.object_path(blob)?;
        match fs::remove_file(&object_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(blob.clone()));
            }
            Err(e) => return Err(e.into()),
        }
        match fs::remove_file(Self::metadata_path(&object_path)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FsBlobStore) {
        let tmp = TempDir::new().unwrap();
        let store = FsBlobStore::open(tmp.path().join("blobs")).unwrap();
        (tmp, store)
    }

    fn staged_files(store: &FsBlobStore) -> usize {
        fs::read_dir(store.root().join(STAGING_DIR)).unwrap().count()
    }

    fn put(store: &FsBlobStore, bytes: &[u8]) -> BlobRef {
        let mut handle = store.open_for_write("image/jpeg").unwrap();
        store.write(&mut handle, bytes).unwrap();
        store.finalize(&mut handle).unwrap().blob
    }

    #[test]
    fn open_creates_layout() {
        let (_tmp, store) = store();
        assert!(store.root().join(STAGING_DIR).is_dir());
        assert!(store.root().join(OBJECTS_DIR).is_dir());
    }

    #[test]
    fn finalize_publishes_content_addressed_blob() {
        let (_tmp, store) = store();
        let blob = put(&store, b"abc");
        assert_eq!(
            blob.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        let meta = store.stat(&blob).unwrap();
        assert_eq!(meta.size, 3);
        assert_eq!(meta.content_type, "image/jpeg");
        assert_eq!(meta.sha256, blob.as_str());
        assert_eq!(staged_files(&store), 0);
    }

    #[test]
    fn staged_write_is_not_visible() {
        let (_tmp, store) = store();
        let mut handle = store.open_for_write("image/jpeg").unwrap();
        store.write(&mut handle, b"abc").unwrap();
        let would_be = BlobRef::new(sha256_hex(Sha256::new_with_prefix(b"abc")));
        assert!(matches!(store.stat(&would_be), Err(StoreError::NotFound(_))));
        store.abort(handle);
        assert_eq!(staged_files(&store), 0);
    }

    #[test]
    fn dropped_handle_cleans_staging() {
        let (_tmp, store) = store();
        {
            let mut handle = store.open_for_write("image/jpeg").unwrap();
            store.write(&mut handle, b"abc").unwrap();
        }
        assert_eq!(staged_files(&store), 0);
    }

    #[test]
    fn read_returns_published_bytes() {
        let (_tmp, store) = store();
        let blob = put(&store, b"hello blob");
        let mut buf = Vec::new();
        store.open_for_read(&blob).unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello blob");
    }

    #[test]
    fn identical_content_shares_a_ref() {
        let (_tmp, store) = store();
        assert_eq!(put(&store, b"same"), put(&store, b"same"));
    }

    #[test]
    fn duplicate_finalize_reports_existing_object() {
        let (_tmp, store) = store();
        let mut first = store.open_for_write("image/jpeg").unwrap();
        store.write(&mut first, b"same").unwrap();
        assert!(store.finalize(&mut first).unwrap().created);

        let mut second = store.open_for_write("image/png").unwrap();
        store.write(&mut second, b"same").unwrap();
        let published = store.finalize(&mut second).unwrap();
        assert!(!published.created);
        assert_eq!(staged_files(&store), 0);
        // The first writer's metadata survives.
        assert_eq!(store.stat(&published.blob).unwrap().content_type, "image/jpeg");
    }

    #[test]
    fn delete_removes_blob_and_sidecar() {
        let (_tmp, store) = store();
        let blob = put(&store, b"bye");
        store.delete(&blob).unwrap();
        assert!(matches!(store.stat(&blob), Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(&blob), Err(StoreError::NotFound(_))));
        assert_eq!(
            fs::read_dir(store.root().join(OBJECTS_DIR)).unwrap().count(),
            0
        );
    }

    #[test]
    fn malformed_refs_never_resolve() {
        let (_tmp, store) = store();
        for bad in ["../../etc/passwd", "ABC", "", "mem-1"] {
            let blob = BlobRef::new(bad);
            assert!(matches!(store.stat(&blob), Err(StoreError::NotFound(_))));
            assert!(matches!(store.open_for_read(&blob), Err(StoreError::NotFound(_))));
        }
    }

    #[test]
    fn write_after_finalize_is_rejected() {
        let (_tmp, store) = store();
        let mut handle = store.open_for_write("image/jpeg").unwrap();
        store.finalize(&mut handle).unwrap();
        assert!(matches!(
            store.write(&mut handle, b"late"),
            Err(StoreError::HandleClosed)
        ));
    }
}
