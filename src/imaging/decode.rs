//! Signature-sniffing decoder.
//!
//! Dispatch is driven by the stream's own leading bytes, never by the
//! declared mime type: uploads routinely arrive with a `.png` label on JPEG
//! bytes. The mapping from signature to decode function is an explicit
//! [`CodecTable`] built once and handed to the [`Decoder`].
//!
//! | Format | Signature | Decode function |
//! |---|---|---|
//! | JPEG | `FF D8 FF` | `image` JPEG decoder |
//! | PNG | `89 50 4E 47 0D 0A 1A 0A` | `image` PNG decoder |
//! | GIF | `GIF87a` / `GIF89a` | `image` GIF decoder (first frame) |

use super::asset::ImageAsset;
use super::cancel::{CancelToken, Cancelled};
use image::{DynamicImage, ImageFormat, ImageReader, ImageResult, Limits};
use serde::Serialize;
use std::fmt;
use std::io::{Cursor, ErrorKind, Read};
use thiserror::Error;
use tracing::debug;

/// Bytes pulled from the source per read call.
const READ_CHUNK: usize = 64 * 1024;

/// Default cap on the size of an encoded upload.
pub const DEFAULT_MAX_SOURCE_BYTES: u64 = 50 * 1024 * 1024;

/// Default cap on either side of a decoded image, in pixels.
pub const DEFAULT_MAX_SIDE: u32 = 16_384;

const JPEG_SIGNATURES: &[&[u8]] = &[b"\xFF\xD8\xFF"];
const PNG_SIGNATURES: &[&[u8]] = &[b"\x89PNG\r\n\x1A\n"];
const GIF_SIGNATURES: &[&[u8]] = &[b"GIF87a", b"GIF89a"];

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to read source stream: {0}")]
    Read(#[source] std::io::Error),
    #[error("Source exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("Unrecognized image signature")]
    UnrecognizedSignature,
    #[error("{format} image exceeds decode limits (max {max_side} px per side)")]
    Oversized { format: SourceFormat, max_side: u32 },
    #[error("Failed to decode {format} image: {source}")]
    Malformed {
        format: SourceFormat,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Format detected from the stream content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Jpeg,
    Png,
    Gif,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceFormat::Jpeg => "JPEG",
            SourceFormat::Png => "PNG",
            SourceFormat::Gif => "GIF",
        })
    }
}

pub type DecodeFn = fn(&[u8], Limits) -> ImageResult<DynamicImage>;

/// One registered codec: the signatures it claims and how to decode them.
#[derive(Clone, Copy)]
pub struct Codec {
    pub format: SourceFormat,
    pub signatures: &'static [&'static [u8]],
    pub decode: DecodeFn,
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("format", &self.format)
            .field("signatures", &self.signatures)
            .finish_non_exhaustive()
    }
}

impl Codec {
    fn matches(&self, bytes: &[u8]) -> bool {
        self.signatures.iter().any(|sig| bytes.starts_with(sig))
    }
}

/// Ordered signature → decoder table. First match wins.
#[derive(Debug, Clone, Default)]
pub struct CodecTable {
    codecs: Vec<Codec>,
}

impl CodecTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// JPEG, PNG and GIF through the `image` crate.
    pub fn standard() -> Self {
        Self::empty()
            .register(Codec {
                format: SourceFormat::Jpeg,
                signatures: JPEG_SIGNATURES,
                decode: decode_jpeg,
            })
            .register(Codec {
                format: SourceFormat::Png,
                signatures: PNG_SIGNATURES,
                decode: decode_png,
            })
            .register(Codec {
                format: SourceFormat::Gif,
                signatures: GIF_SIGNATURES,
                decode: decode_gif,
            })
    }

    pub fn register(mut self, codec: Codec) -> Self {
        self.codecs.push(codec);
        self
    }

    pub fn sniff(&self, bytes: &[u8]) -> Option<&Codec> {
        self.codecs.iter().find(|c| c.matches(bytes))
    }
}

fn decode_as(format: ImageFormat, bytes: &[u8], limits: Limits) -> ImageResult<DynamicImage> {
    let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
    reader.limits(limits);
    reader.decode()
}

fn decode_jpeg(bytes: &[u8], limits: Limits) -> ImageResult<DynamicImage> {
    decode_as(ImageFormat::Jpeg, bytes, limits)
}

fn decode_png(bytes: &[u8], limits: Limits) -> ImageResult<DynamicImage> {
    decode_as(ImageFormat::Png, bytes, limits)
}

fn decode_gif(bytes: &[u8], limits: Limits) -> ImageResult<DynamicImage> {
    decode_as(ImageFormat::Gif, bytes, limits)
}

/// Turns a byte stream into an [`ImageAsset`].
#[derive(Debug, Clone)]
pub struct Decoder {
    codecs: CodecTable,
    max_source_bytes: u64,
    max_side: u32,
}

impl Decoder {
    pub fn new(codecs: CodecTable, max_source_bytes: u64) -> Self {
        Self {
            codecs,
            max_source_bytes,
            max_side: DEFAULT_MAX_SIDE,
        }
    }

    /// Reject images wider or taller than `max_side` before their pixels
    /// are allocated.
    pub fn with_max_side(mut self, max_side: u32) -> Self {
        self.max_side = max_side;
        self
    }

    fn limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_side);
        limits.max_image_height = Some(self.max_side);
        limits
    }

    /// Read `reader` to the end, sniff its format, and decode it.
    ///
    /// A stream that fails mid-read, exceeds the size cap, carries an
    /// unknown signature, or fails to decode is terminal for this asset.
    pub fn decode<R: Read>(
        &self,
        reader: R,
        cancel: &CancelToken,
    ) -> Result<(ImageAsset, SourceFormat), DecodeError> {
        let bytes = self.read_source(reader, cancel)?;
        self.decode_bytes(&bytes)
    }

    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<(ImageAsset, SourceFormat), DecodeError> {
        let codec = self
            .codecs
            .sniff(bytes)
            .ok_or(DecodeError::UnrecognizedSignature)?;
        let img = (codec.decode)(bytes, self.limits()).map_err(|source| match source {
            image::ImageError::Limits(_) => DecodeError::Oversized {
                format: codec.format,
                max_side: self.max_side,
            },
            source => DecodeError::Malformed {
                format: codec.format,
                source,
            },
        })?;
        debug!(
            format = %codec.format,
            width = img.width(),
            height = img.height(),
            "decoded source image"
        );
        Ok((ImageAsset::from(img), codec.format))
    }

    fn read_source<R: Read>(
        &self,
        mut reader: R,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, DecodeError> {
        let mut bytes = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            cancel.check()?;
            let n = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(DecodeError::Read(e)),
            };
            if (bytes.len() + n) as u64 > self.max_source_bytes {
                return Err(DecodeError::TooLarge {
                    limit: self.max_source_bytes,
                });
            }
            bytes.extend_from_slice(&chunk[..n]);
        }
        debug!(bytes = bytes.len(), "read source stream");
        Ok(bytes)
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(CodecTable::standard(), DEFAULT_MAX_SOURCE_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{gif_bytes, jpeg_bytes, png_bytes};

    #[test]
    fn decodes_each_registered_format() {
        let decoder = Decoder::default();
        let cancel = CancelToken::new();

        let (asset, format) = decoder.decode(&jpeg_bytes(40, 30)[..], &cancel).unwrap();
        assert_eq!((asset.dimensions(), format), ((40, 30), SourceFormat::Jpeg));

        let (asset, format) = decoder.decode(&png_bytes(12, 7)[..], &cancel).unwrap();
        assert_eq!((asset.dimensions(), format), ((12, 7), SourceFormat::Png));

        let (asset, format) = decoder.decode(&gif_bytes(9, 5)[..], &cancel).unwrap();
        assert_eq!((asset.dimensions(), format), ((9, 5), SourceFormat::Gif));
    }

    #[test]
    fn png_pixels_survive_decode() {
        let decoder = Decoder::default();
        let (asset, _) = decoder.decode_bytes(&png_bytes(4, 4)).unwrap();
        // test_helpers::gradient: (x * 60, y * 60, 128)
        assert_eq!(asset.get_pixel(2, 3), Some(image::Rgba([120, 180, 128, 255])));
    }

    #[test]
    fn sniffing_ignores_what_the_caller_thinks() {
        // PNG bytes are decoded as PNG whatever label they arrived under.
        let table = CodecTable::standard();
        assert_eq!(table.sniff(&png_bytes(2, 2)).unwrap().format, SourceFormat::Png);
        assert_eq!(table.sniff(&jpeg_bytes(2, 2)).unwrap().format, SourceFormat::Jpeg);
    }

    #[test]
    fn unknown_signature_is_rejected() {
        let err = Decoder::default().decode_bytes(b"BM\x00\x00not a bitmap").unwrap_err();
        assert!(matches!(err, DecodeError::UnrecognizedSignature));
    }

    #[test]
    fn empty_stream_is_rejected() {
        let err = Decoder::default().decode_bytes(&[]).unwrap_err();
        assert!(matches!(err, DecodeError::UnrecognizedSignature));
    }

    #[test]
    fn truncated_png_is_malformed() {
        let bytes = png_bytes(32, 32);
        let err = Decoder::default().decode_bytes(&bytes[..20]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Malformed {
                format: SourceFormat::Png,
                ..
            }
        ));
    }

    #[test]
    fn truncated_jpeg_header_is_malformed() {
        let bytes = jpeg_bytes(32, 32);
        let err = Decoder::default().decode_bytes(&bytes[..12]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Malformed {
                format: SourceFormat::Jpeg,
                ..
            }
        ));
    }

    #[test]
    fn empty_table_recognizes_nothing() {
        let decoder = Decoder::new(CodecTable::empty(), DEFAULT_MAX_SOURCE_BYTES);
        let err = decoder.decode_bytes(&png_bytes(2, 2)).unwrap_err();
        assert!(matches!(err, DecodeError::UnrecognizedSignature));
    }

    #[test]
    fn oversized_source_is_rejected() {
        let decoder = Decoder::new(CodecTable::standard(), 16);
        let err = decoder
            .decode(&png_bytes(8, 8)[..], &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, DecodeError::TooLarge { limit: 16 }));
    }

    #[test]
    fn image_beyond_side_limit_is_rejected() {
        let decoder = Decoder::default().with_max_side(8);
        let err = decoder.decode_bytes(&png_bytes(16, 4)).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Oversized {
                format: SourceFormat::Png,
                max_side: 8
            }
        ));
        assert!(decoder.decode_bytes(&png_bytes(8, 8)).is_ok());
    }

    #[test]
    fn cancelled_token_stops_the_read() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = Decoder::default()
            .decode(&png_bytes(8, 8)[..], &cancel)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Cancelled(_)));
    }

    #[test]
    fn read_failure_is_reported() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("connection reset"))
            }
        }
        let err = Decoder::default()
            .decode(Broken, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, DecodeError::Read(_)));
    }
}
