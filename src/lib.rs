//! # blob-squeeze
//!
//! Recompresses uploaded images into bounded-size JPEGs before they reach
//! blob storage. JPEG, PNG and GIF sources are decoded, downscaled so the
//! longer side fits a caller-supplied bound, and re-encoded as JPEG at a
//! caller-supplied quality. Anything else is rejected up front.
//!
//! # Architecture: One Linear Pipeline
//!
//! ```text
//! FormatGate → Decoder → plan_resize → resize → encode_jpeg → commit
//!  (mime)      (sniff)    (two-pass)   (if needed)  (JPEG)     (staged write)
//! ```
//!
//! Every stage before `commit` is a pure transformation of in-memory data.
//! The store sees nothing until an encoded JPEG exists, and a commit that
//! fails halfway leaves no visible object behind.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Format gate, signature-sniffing decoder, resize planner, resampler, JPEG encoder |
//! | [`store`] | `BlobStore` contract, staged-write reconciler, filesystem and in-memory stores |
//! | [`pipeline`] | `Optimizer`: the end-to-end compress / commit / replace operations |
//! | [`batch`] | Parallel recompression of a whole directory tree |
//! | [`config`] | `blob-squeeze.toml` loading, merging over stock defaults, validation |
//! | [`output`] | CLI output formatting for every command |
//!
//! # Design Decisions
//!
//! ## Content Decides the Codec
//!
//! The declared mime type only decides *whether* an upload is recompressed.
//! Which decoder runs is decided by the leading bytes of the stream, so a
//! PNG uploaded as `image/jpeg` still decodes correctly.
//!
//! ## Width First, Then Height
//!
//! The resize plan bounds the width and then the height, flooring the
//! other side each time. See [`imaging::plan_resize`] for the exact rules.
//!
//! ## Staged Writes
//!
//! Stores publish a blob only on `finalize`. The reconciler in [`store`]
//! owns the cleanup for every failure point (write, finalize, stat), so
//! callers never have to reason about half-written objects.

pub mod batch;
pub mod config;
pub mod imaging;
pub mod output;
pub mod pipeline;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;
