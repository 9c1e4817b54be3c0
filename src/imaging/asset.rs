//! In-memory raster shared by the decode, resample, and encode stages.

use image::{DynamicImage, Rgba, RgbaImage};

/// A decoded image: 8-bit RGBA pixels with explicit dimensions.
///
/// Assets are never mutated after construction. Stages that change pixels
/// (the resampler) build a new asset instead.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    raster: RgbaImage,
}

impl ImageAsset {
    /// Build an asset by evaluating `f` once for every pixel.
    pub fn from_fn<F>(width: u32, height: u32, f: F) -> Self
    where
        F: FnMut(u32, u32) -> Rgba<u8>,
    {
        Self {
            raster: RgbaImage::from_fn(width, height, f),
        }
    }

    pub fn from_raster(raster: RgbaImage) -> Self {
        Self { raster }
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.raster.dimensions()
    }

    /// Pixel at `(x, y)`, or `None` outside the raster.
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.raster.get_pixel_checked(x, y).copied()
    }

    pub fn raster(&self) -> &RgbaImage {
        &self.raster
    }
}

impl From<DynamicImage> for ImageAsset {
    fn from(img: DynamicImage) -> Self {
        Self {
            raster: img.into_rgba8(),
        }
    }
}
