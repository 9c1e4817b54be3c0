//! Full-raster resampling.
//!
//! Every filter maps the whole source onto the whole target; there is no
//! source rectangle. `Nearest` and `Bilinear` are implemented here and cost
//! a fixed number of taps per output pixel (1 and 4), so a resize is linear
//! in the output size. `Lanczos3` hands off to `image::imageops::resize`,
//! whose per-pixel cost grows with the downscale ratio.
//!
//! Sample positions use pixel-center alignment: output pixel `x` samples the
//! source at `(x + 0.5) * src_w / dst_w - 0.5`, clamped to the raster. Taps
//! are clamped to valid coordinates, so no filter reads outside the source.

use super::asset::ImageAsset;
use image::Rgba;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

/// Interpolation used when the planner asks for a resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleFilter {
    Nearest,
    #[default]
    Bilinear,
    Lanczos3,
}

/// Resample `asset` to exactly `width × height`, returning a new asset.
///
/// The source is left untouched. A zero target size yields an empty raster.
pub fn resize(asset: &ImageAsset, width: u32, height: u32, filter: ResampleFilter) -> ImageAsset {
    if width == 0 || height == 0 || asset.width() == 0 || asset.height() == 0 {
        return ImageAsset::from_fn(width, height, |_, _| Rgba([0, 0, 0, 0]));
    }
    match filter {
        ResampleFilter::Nearest => nearest(asset, width, height),
        ResampleFilter::Bilinear => bilinear(asset, width, height),
        ResampleFilter::Lanczos3 => ImageAsset::from_raster(image::imageops::resize(
            asset.raster(),
            width,
            height,
            FilterType::Lanczos3,
        )),
    }
}

/// Source coordinate sampled by output coordinate `dst` along one axis.
#[inline]
fn source_coord(dst: u32, src_len: u32, dst_len: u32) -> f32 {
    let scale = src_len as f32 / dst_len as f32;
    ((dst as f32 + 0.5) * scale - 0.5).clamp(0.0, (src_len - 1) as f32)
}

/// Precomputed taps for one axis: (lower index, upper index, weight of upper).
fn axis_taps(src_len: u32, dst_len: u32) -> Vec<(u32, u32, f32)> {
    (0..dst_len)
        .map(|d| {
            let s = source_coord(d, src_len, dst_len);
            let lo = s.floor() as u32;
            let hi = (lo + 1).min(src_len - 1);
            (lo, hi, s - lo as f32)
        })
        .collect()
}

fn nearest(asset: &ImageAsset, width: u32, height: u32) -> ImageAsset {
    let src = asset.raster();
    let xs: Vec<u32> = (0..width)
        .map(|x| source_coord(x, src.width(), width).round() as u32)
        .collect();
    let ys: Vec<u32> = (0..height)
        .map(|y| source_coord(y, src.height(), height).round() as u32)
        .collect();
    ImageAsset::from_fn(width, height, |x, y| {
        *src.get_pixel(xs[x as usize], ys[y as usize])
    })
}

fn bilinear(asset: &ImageAsset, width: u32, height: u32) -> ImageAsset {
    let src = asset.raster();
    let xs = axis_taps(src.width(), width);
    let ys = axis_taps(src.height(), height);

    ImageAsset::from_fn(width, height, |x, y| {
        let (x0, x1, fx) = xs[x as usize];
        let (y0, y1, fy) = ys[y as usize];
        let p00 = src.get_pixel(x0, y0).0;
        let p10 = src.get_pixel(x1, y0).0;
        let p01 = src.get_pixel(x0, y1).0;
        let p11 = src.get_pixel(x1, y1).0;

        let mut out = [0u8; 4];
        for c in 0..4 {
            let top = p00[c] as f32 + (p10[c] as f32 - p00[c] as f32) * fx;
            let bottom = p01[c] as f32 + (p11[c] as f32 - p01[c] as f32) * fx;
            out[c] = (top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u8;
        }
        Rgba(out)
    })
}
