//! JPEG output encoding.
//!
//! Every output is baseline JPEG, whatever the source format was. JPEG has
//! no alpha channel, so translucent pixels are premultiplied onto black
//! before encoding.

use super::asset::ImageAsset;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use thiserror::Error;
use tracing::debug;

/// Content type of everything [`encode_jpeg`] produces.
pub const OUTPUT_MIME_TYPE: &str = "image/jpeg";

/// Quality values the JPEG codec accepts.
pub const QUALITY_RANGE: std::ops::RangeInclusive<i32> = 1..=100;

/// JPEG frame headers store each side in 16 bits.
const MAX_JPEG_SIDE: u32 = u16::MAX as u32;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("JPEG quality {quality} outside accepted range 1-100")]
    QualityOutOfRange { quality: i32 },
    #[error("Cannot encode {width}x{height} image as JPEG: sides must be 1-65535")]
    Dimensions { width: u32, height: u32 },
    #[error("Failed to encode {width}x{height} image as JPEG: {source}")]
    Codec {
        width: u32,
        height: u32,
        #[source]
        source: image::ImageError,
    },
}

/// Encode `asset` as JPEG at `quality`.
///
/// `quality` is handed to the codec as-is; it is only rejected when it falls
/// outside the codec's own range.
pub fn encode_jpeg(asset: &ImageAsset, quality: i32) -> Result<Vec<u8>, EncodeError> {
    if !QUALITY_RANGE.contains(&quality) {
        return Err(EncodeError::QualityOutOfRange { quality });
    }
    let (width, height) = asset.dimensions();
    if width == 0 || height == 0 || width > MAX_JPEG_SIDE || height > MAX_JPEG_SIDE {
        return Err(EncodeError::Dimensions { width, height });
    }
    let rgb = flatten_alpha(asset);

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality as u8)
        .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|source| EncodeError::Codec {
            width,
            height,
            source,
        })?;
    debug!(width, height, quality, bytes = out.len(), "encoded JPEG");
    Ok(out)
}

/// Drop alpha by premultiplying each channel onto a black background.
fn flatten_alpha(asset: &ImageAsset) -> RgbImage {
    let src = asset.raster();
    RgbImage::from_fn(src.width(), src.height(), |x, y| {
        let [r, g, b, a] = src.get_pixel(x, y).0;
        let premultiply = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
        image::Rgb([premultiply(r), premultiply(g), premultiply(b)])
    })
}
