//! The recompression pipeline.
//!
//! ```text
//! FormatGate → Decoder → plan_resize → resize (only if needed) → encode_jpeg → commit
//! ```
//!
//! [`Optimizer`] holds the immutable pieces (gate, codec table, resample
//! filter) and is shared across threads; each call is a self-contained
//! invocation with its own [`CancelToken`]. Only the final store commit has
//! side effects.

use crate::imaging::{
    CancelToken, CodecTable, CompressionParams, DecodeError, Decoder, EncodeError, FormatGate,
    ImageAsset, OUTPUT_MIME_TYPE, ResampleFilter, SourceFormat, TargetDimensions,
    UnsupportedFormat, encode_jpeg, plan_resize, resize,
};
use crate::store::{BlobRef, BlobStore, StoreError, StoredObject, commit};
use std::borrow::Cow;
use std::io::Read;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("Unsupported mime-type: {mime_type}")]
    UnsupportedFormat { mime_type: String },
    #[error("Decode failed: {0}")]
    Decode(DecodeError),
    #[error("Encode failed: {0}")]
    Encode(#[from] EncodeError),
    #[error("Store failed: {0}")]
    Store(StoreError),
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<UnsupportedFormat> for CompressError {
    fn from(e: UnsupportedFormat) -> Self {
        CompressError::UnsupportedFormat {
            mime_type: e.mime_type,
        }
    }
}

impl From<DecodeError> for CompressError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::Cancelled(_) => CompressError::Cancelled,
            other => CompressError::Decode(other),
        }
    }
}

impl From<StoreError> for CompressError {
    fn from(e: StoreError) -> Self {
        if e.is_cancelled() {
            CompressError::Cancelled
        } else {
            CompressError::Store(e)
        }
    }
}

/// Result of an in-memory recompression.
#[derive(Debug, Clone)]
pub struct Compressed {
    pub bytes: Vec<u8>,
    pub source_format: SourceFormat,
    pub source_dimensions: (u32, u32),
    pub output: TargetDimensions,
}

impl Compressed {
    pub fn resized(&self) -> bool {
        !self.output.matches(self.source_dimensions)
    }
}

/// Result of [`Optimizer::replace_blob`].
#[derive(Debug, Clone)]
pub enum ReplaceOutcome {
    /// The new blob is committed. `old_deleted` is false if removing the
    /// original failed (or was skipped because the refs are identical).
    Replaced {
        stored: StoredObject,
        old: BlobRef,
        old_deleted: bool,
    },
    /// The declared type is not recompressible; the original stays as is.
    PassThrough { original: BlobRef },
}

/// Configured recompression pipeline.
#[derive(Debug, Clone)]
pub struct Optimizer {
    gate: FormatGate,
    decoder: Decoder,
    filter: ResampleFilter,
}

impl Optimizer {
    pub fn new(gate: FormatGate, decoder: Decoder, filter: ResampleFilter) -> Self {
        Self {
            gate,
            decoder,
            filter,
        }
    }

    /// Standard gate and codecs with the given filter and source size cap.
    pub fn with_settings(filter: ResampleFilter, max_source_bytes: u64) -> Self {
        Self::new(
            FormatGate::new(),
            Decoder::new(CodecTable::standard(), max_source_bytes),
            filter,
        )
    }

    /// Validate, decode, resize, and encode one image. No store is touched.
    ///
    /// The declared mime type is checked before `source` is read at all.
    pub fn compress<R: Read>(
        &self,
        source: R,
        params: &CompressionParams,
        cancel: &CancelToken,
    ) -> Result<Compressed, CompressError> {
        self.gate.validate(&params.mime_type)?;

        let (asset, source_format) = self.decoder.decode(source, cancel)?;
        let source_dimensions = asset.dimensions();
        let output = plan_resize(
            source_dimensions.0,
            source_dimensions.1,
            params.max_dimension,
        );

        let bytes = encode_jpeg(&fit(&asset, output, self.filter), params.quality)?;

        info!(
            declared = %params.mime_type,
            sniffed = %source_format,
            width = output.width,
            height = output.height,
            bytes = bytes.len(),
            "recompressed image"
        );
        Ok(Compressed {
            bytes,
            source_format,
            source_dimensions,
            output,
        })
    }

    /// Recompress `source` and commit the result to `store`.
    ///
    /// Nothing is written unless decoding and encoding both succeed.
    pub fn compress_and_commit<R: Read, S: BlobStore + ?Sized>(
        &self,
        source: R,
        params: &CompressionParams,
        store: &S,
        cancel: &CancelToken,
    ) -> Result<StoredObject, CompressError> {
        let compressed = self.compress(source, params, cancel)?;
        Ok(commit(store, &compressed.bytes, OUTPUT_MIME_TYPE, cancel)?)
    }

    /// Swap a stored blob for its recompressed version.
    ///
    /// The new blob is committed first; only then is `old` deleted, as a
    /// separate step. A failed delete is logged and reported through
    /// `old_deleted`, since the replacement is already durable.
    pub fn replace_blob<S: BlobStore + ?Sized>(
        &self,
        store: &S,
        old: &BlobRef,
        params: &CompressionParams,
        cancel: &CancelToken,
    ) -> Result<ReplaceOutcome, CompressError> {
        if let Err(rejected) = self.gate.validate(&params.mime_type) {
            debug!(blob = %old, mime_type = %rejected.mime_type, "passing blob through");
            return Ok(ReplaceOutcome::PassThrough {
                original: old.clone(),
            });
        }

        let source = store.open_for_read(old)?;
        let stored = self.compress_and_commit(source, params, store, cancel)?;

        let old_deleted = if stored.blob == *old {
            false
        } else {
            match store.delete(old) {
                Ok(()) => true,
                Err(e) => {
                    warn!(old = %old, new = %stored.blob, error = %e, "failed to delete replaced blob");
                    false
                }
            }
        };
        info!(old = %old, new = %stored.blob, size = stored.metadata.size, "replaced blob");
        Ok(ReplaceOutcome::Replaced {
            stored,
            old: old.clone(),
            old_deleted,
        })
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(FormatGate::new(), Decoder::default(), ResampleFilter::default())
    }
}

/// `asset` at the planned size. A source that already fits is borrowed as
/// is and the resampler never runs on it.
fn fit(
    asset: &ImageAsset,
    output: TargetDimensions,
    filter: ResampleFilter,
) -> Cow<'_, ImageAsset> {
    let (width, height) = asset.dimensions();
    if output.matches((width, height)) {
        return Cow::Borrowed(asset);
    }
    debug!(
        from_width = width,
        from_height = height,
        to_width = output.width,
        to_height = output.height,
        filter = ?filter,
        "resized"
    );
    Cow::Owned(resize(asset, output.width, output.height, filter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CommitStage, FaultyStore, MemoryBlobStore};
    use crate::test_helpers::{CountingReader, gif_bytes, jpeg_bytes, png_bytes};
    use std::io::Read;

    fn decode_dims(bytes: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory(bytes).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn unsupported_type_is_rejected_before_any_read() {
        let optimizer = Optimizer::default();
        let source = CountingReader::new(png_bytes(8, 8));
        let reads = source.reads();
        let err = optimizer
            .compress(source, &CompressionParams::with_defaults("image/bmp"), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, CompressError::UnsupportedFormat { mime_type } if mime_type == "image/bmp"));
        assert_eq!(reads.get(), 0);
    }

    #[test]
    fn small_image_is_reencoded_without_resize() {
        let optimizer = Optimizer::default();
        let out = optimizer
            .compress(
                &png_bytes(40, 30)[..],
                &CompressionParams::new("image/png", 80, 1024),
                &CancelToken::new(),
            )
            .unwrap();
        assert!(!out.resized());
        assert_eq!(out.source_format, SourceFormat::Png);
        assert_eq!(decode_dims(&out.bytes), (40, 30));
        assert!(out.bytes.starts_with(&[0xFF, 0xD8, 0xFF]));

        // Same bytes as encoding the decoded source directly.
        let (asset, _) = Decoder::default().decode_bytes(&png_bytes(40, 30)).unwrap();
        assert_eq!(out.bytes, encode_jpeg(&asset, 80).unwrap());
    }

    #[test]
    fn fitting_asset_skips_the_resampler() {
        let (asset, _) = Decoder::default().decode_bytes(&png_bytes(40, 30)).unwrap();
        for filter in [
            ResampleFilter::Nearest,
            ResampleFilter::Bilinear,
            ResampleFilter::Lanczos3,
        ] {
            let fitted = fit(&asset, plan_resize(40, 30, 1024), filter);
            assert!(matches!(fitted, Cow::Borrowed(a) if std::ptr::eq(a, &asset)));
            let unbounded = fit(&asset, plan_resize(40, 30, 0), filter);
            assert!(matches!(unbounded, Cow::Borrowed(_)));
        }
        let shrunk = fit(&asset, plan_resize(40, 30, 20), ResampleFilter::Bilinear);
        assert!(matches!(shrunk, Cow::Owned(ref a) if a.dimensions() == (20, 15)));
    }

    #[test]
    fn landscape_is_bounded_by_width() {
        let optimizer = Optimizer::default();
        let out = optimizer
            .compress(
                &jpeg_bytes(400, 200)[..],
                &CompressionParams::new("image/jpeg", 75, 100),
                &CancelToken::new(),
            )
            .unwrap();
        assert!(out.resized());
        assert_eq!(out.output, TargetDimensions::new(100, 50));
        assert_eq!(decode_dims(&out.bytes), (100, 50));
    }

    #[test]
    fn portrait_is_bounded_by_height() {
        let optimizer = Optimizer::default();
        let out = optimizer
            .compress(
                &png_bytes(80, 240)[..],
                &CompressionParams::new("image/png", 75, 102),
                &CancelToken::new(),
            )
            .unwrap();
        // 80 * (102 / 240) = 34
        assert_eq!(decode_dims(&out.bytes), (34, 102));
    }

    #[test]
    fn mislabeled_upload_is_decoded_by_signature() {
        let optimizer = Optimizer::default();
        let out = optimizer
            .compress(
                &gif_bytes(10, 10)[..],
                &CompressionParams::with_defaults("image/jpeg"),
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(out.source_format, SourceFormat::Gif);
    }

    #[test]
    fn quality_out_of_range_is_an_encode_error() {
        let optimizer = Optimizer::default();
        let err = optimizer
            .compress(
                &png_bytes(4, 4)[..],
                &CompressionParams::new("image/png", 0, 0),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CompressError::Encode(EncodeError::QualityOutOfRange { quality: 0 })
        ));
    }

    #[test]
    fn cancelled_read_maps_to_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = Optimizer::default()
            .compress(
                &png_bytes(4, 4)[..],
                &CompressionParams::with_defaults("image/png"),
                &cancel,
            )
            .unwrap_err();
        assert!(matches!(err, CompressError::Cancelled));
    }

    #[test]
    fn truncated_stream_never_reaches_the_store() {
        let store = FaultyStore::default();
        let bytes = png_bytes(32, 32);
        let err = Optimizer::default()
            .compress_and_commit(
                &bytes[..24],
                &CompressionParams::with_defaults("image/png"),
                &store,
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, CompressError::Decode(_)));
        assert!(store.calls().is_empty());
    }

    #[test]
    fn commit_stores_jpeg_with_metadata() {
        let store = MemoryBlobStore::new();
        let stored = Optimizer::default()
            .compress_and_commit(
                &png_bytes(64, 64)[..],
                &CompressionParams::new("image/png", 70, 32),
                &store,
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(stored.metadata.content_type, "image/jpeg");
        let bytes = store.get(&stored.blob).unwrap();
        assert_eq!(stored.metadata.size, bytes.len() as u64);
        assert_eq!(decode_dims(&bytes), (32, 32));
    }

    #[test]
    fn finalize_failure_surfaces_as_store_error() {
        let store = FaultyStore::failing_at(CommitStage::Finalize);
        let err = Optimizer::default()
            .compress_and_commit(
                &png_bytes(16, 16)[..],
                &CompressionParams::with_defaults("image/png"),
                &store,
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CompressError::Store(StoreError::Commit {
                stage: CommitStage::Finalize,
                ..
            })
        ));
        assert!(store.inner.is_empty());
    }

    #[test]
    fn replace_commits_new_then_deletes_old() {
        let store = MemoryBlobStore::new();
        let old = store.insert("image/png", png_bytes(300, 100));
        let outcome = Optimizer::default()
            .replace_blob(
                &store,
                &old,
                &CompressionParams::new("image/png", 75, 150),
                &CancelToken::new(),
            )
            .unwrap();

        let ReplaceOutcome::Replaced {
            stored,
            old: replaced,
            old_deleted,
        } = outcome
        else {
            panic!("expected replacement");
        };
        assert_eq!(replaced, old);
        assert!(old_deleted);
        assert!(store.stat(&old).is_err());
        assert_eq!(store.refs(), vec![stored.blob.clone()]);

        let mut bytes = Vec::new();
        store
            .open_for_read(&stored.blob)
            .unwrap()
            .read_to_end(&mut bytes)
            .unwrap();
        assert_eq!(decode_dims(&bytes), (150, 50));
    }

    #[test]
    fn replace_passes_unsupported_types_through() {
        let store = FaultyStore::default();
        let original = store.inner.insert("image/webp", b"RIFF....WEBP".to_vec());
        let outcome = Optimizer::default()
            .replace_blob(
                &store,
                &original,
                &CompressionParams::with_defaults("image/webp"),
                &CancelToken::new(),
            )
            .unwrap();
        assert!(matches!(outcome, ReplaceOutcome::PassThrough { original: o } if o == original));
        assert!(store.calls().is_empty());
    }

    #[test]
    fn replace_keeps_old_blob_when_commit_fails() {
        let store = FaultyStore::failing_at(CommitStage::Write);
        let old = store.inner.insert("image/png", png_bytes(20, 20));
        let err = Optimizer::default()
            .replace_blob(
                &store,
                &old,
                &CompressionParams::with_defaults("image/png"),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, CompressError::Store(_)));
        assert_eq!(store.inner.refs(), vec![old]);
        assert!(!store.calls().contains(&"delete"));
    }

    #[test]
    fn replace_of_missing_blob_is_a_store_error() {
        let store = MemoryBlobStore::new();
        let err = Optimizer::default()
            .replace_blob(
                &store,
                &BlobRef::new("mem-404"),
                &CompressionParams::with_defaults("image/jpeg"),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, CompressError::Store(StoreError::NotFound(_))));
    }
}
