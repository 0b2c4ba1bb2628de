//! Shared test utilities: synthetic images and on-disk fixtures.
//!
//! Noise images are deterministic, and compress badly enough that quality
//! settings make a visible difference in encoded size.

use image::codecs::avif::AvifEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};

// =========================================================================
// Synthetic images
// =========================================================================

/// A `width` x `height` RGB image filled with pseudo-random noise.
pub fn noisy_image(width: u32, height: u32) -> DynamicImage {
    let mut state: u32 = 0x2545_f491 ^ width.wrapping_mul(31) ^ height;
    let img = RgbImage::from_fn(width, height, |x, y| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let n = (state >> 24) as u8;
        // A gradient underneath keeps the image from being pure noise.
        let base = ((x + y) % 256) as u8;
        Rgb([n, base.wrapping_add(n / 2), base])
    });
    DynamicImage::ImageRgb8(img)
}

/// Encode `image` into the given container format.
pub fn encode_as(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), format)
        .unwrap_or_else(|e| panic!("encoding test image as {format:?}: {e}"));
    buf
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_as(&noisy_image(width, height), ImageFormat::Png)
}

/// AVIF file bytes, encoded at the fastest rav1e speed.
pub fn avif_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    noisy_image(width, height)
        .write_with_encoder(AvifEncoder::new_with_speed_quality(&mut buf, 10, 80))
        .unwrap();
    buf
}

// =========================================================================
// Filesystem fixtures
// =========================================================================

/// Write `bytes` to `dir/name`, creating parent directories.
pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, bytes).unwrap();
    path
}

pub fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    write_file(dir, name, &png_bytes(width, height))
}
