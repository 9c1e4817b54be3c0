//! Image processing: decode, plan, resample, encode.
//!
//! | Stage | Module | Crate / function |
//! |---|---|---|
//! | **Format gate** | [`format_gate`] | fixed mime set, no I/O |
//! | **Decode** | [`decode`] | signature table → `image` JPEG/PNG/GIF decoders |
//! | **Plan** | `calculations` | two-pass floor math, pure |
//! | **Resample** | [`resample`] | hand-written nearest/bilinear, `imageops` Lanczos3 |
//! | **Encode** | [`encode`] | `image::codecs::jpeg::JpegEncoder` |
//!
//! Every stage here is a pure transformation. Side effects against a store
//! belong to [`crate::store`]; [`crate::pipeline`] strings the two together.

mod asset;
pub mod cancel;
mod calculations;
pub mod decode;
pub mod encode;
pub mod format_gate;
mod params;
pub mod resample;

pub use asset::ImageAsset;
pub use calculations::{TargetDimensions, plan_resize};
pub use cancel::{CancelToken, Cancelled};
pub use decode::{CodecTable, DecodeError, Decoder, SourceFormat};
pub use encode::{EncodeError, OUTPUT_MIME_TYPE, encode_jpeg};
pub use format_gate::{FormatGate, UnsupportedFormat, mime_for_extension};
pub use params::{CompressionParams, DEFAULT_QUALITY};
pub use resample::{ResampleFilter, resize};
