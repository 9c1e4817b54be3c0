//! Shared test utilities: synthetic images in every accepted format.
//!
//! All images are the same deterministic gradient, so pixel assertions can
//! be written against [`gradient`] directly.

use image::{DynamicImage, ImageFormat, RgbImage};
use std::cell::Cell;
use std::io::{Cursor, Read};
use std::path::Path;
use std::rc::Rc;

/// `(x * 60, y * 60, 128)` per pixel, wrapping at 256.
pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 60 % 256) as u8, (y * 60 % 256) as u8, 128])
    })
}

fn encoded(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encoded(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Jpeg)
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encoded(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Png)
}

pub fn gif_bytes(width: u32, height: u32) -> Vec<u8> {
    let rgba = DynamicImage::ImageRgb8(gradient(width, height)).into_rgba8();
    encoded(DynamicImage::ImageRgba8(rgba), ImageFormat::Gif)
}

/// Write a synthetic image to `path`, picking the format from its extension.
pub fn write_image(path: &Path, width: u32, height: u32) {
    let bytes = match path.extension().and_then(|e| e.to_str()) {
        Some("png") => png_bytes(width, height),
        Some("gif") => gif_bytes(width, height),
        _ => jpeg_bytes(width, height),
    };
    std::fs::write(path, bytes).unwrap();
}

/// Reader that counts how many times `read` was called.
pub struct CountingReader {
    inner: Cursor<Vec<u8>>,
    reads: Rc<Cell<usize>>,
}

impl CountingReader {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            inner: Cursor::new(bytes),
            reads: Rc::default(),
        }
    }

    /// Shared counter; stays readable after the reader is moved away.
    pub fn reads(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.reads)
    }
}

impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reads.set(self.reads.get() + 1);
        self.inner.read(buf)
    }
}
