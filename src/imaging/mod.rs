//! Image conversion: raster in, WebP out.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image` (JPEG, PNG, GIF, BMP, TIFF, WebP), `avif-parse` + `rav1d` (AVIF) |
//! | **Resize** | `resize_exact` with Lanczos3 |
//! | **Encode** | libwebp via `webp`, or the `image` lossless WebP encoder |
//!
//! The module is split into:
//! - **Calculations**: Pure dimension policy (unit testable)
//! - **Parameters**: Clamped quality/scale newtypes and conversion options
//! - **Backend**: [`Codec`] trait + [`LibwebpCodec`] / [`ImageRsCodec`]
//! - **Operations**: [`convert_image`], combining calculations + codec
//! - **Init**: [`InitGate`] and [`Converter`] for services that share a codec

mod avif;
pub mod backend;
mod calculations;
pub mod init;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{Codec, CodecError, Dimensions, RawImage};
pub use calculations::calculate_target_dimensions;
pub use init::{Converter, InitError, InitGate};
pub use operations::{CancellationToken, Conversion, ConvertError, convert_image};
pub use params::{
    ConvertOptions, DEFAULT_MAX_DIMENSION, EncodeParams, Quality, ScalePercent,
    WEBP_MAX_DIMENSION,
};
pub use rust_backend::{CodecBackend, CodecKind, ImageRsCodec, LibwebpCodec};
