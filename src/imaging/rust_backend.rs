//! Production codec backends.
//!
//! Both backends share decoding and resizing; they differ only in the WebP
//! encoder.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, BMP, TIFF, WebP) | `image::load_from_memory_with_format` |
//! | Decode (AVIF) | `avif-parse` (container) + `rav1d` (AV1 decode) + BT.601 YUV→RGB |
//! | Resize | `image::DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → WebP ([`LibwebpCodec`]) | `webp::Encoder::encode_simple` (libwebp) |
//! | Encode → WebP ([`ImageRsCodec`]) | `image::codecs::webp::WebPEncoder` (lossless only) |

use super::avif::decode_avif;
use super::backend::{Codec, CodecError, RawImage};
use super::params::EncodeParams;
use crate::types::SourceFormat;
use image::DynamicImage;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

fn decode_dynamic(bytes: &[u8], format: SourceFormat) -> Result<RawImage<DynamicImage>, CodecError> {
    let img = match format.image_format() {
        Some(image_format) => image::load_from_memory_with_format(bytes, image_format)
            .map_err(|e| decode_error(format, e))?,
        None => decode_avif(bytes)?,
    };
    Ok(RawImage {
        width: img.width(),
        height: img.height(),
        pixels: img,
    })
}

/// Unsupported variants of a known format (say, an exotic TIFF compression)
/// are reported apart from corrupt data.
fn decode_error(format: SourceFormat, err: image::ImageError) -> CodecError {
    match err {
        image::ImageError::Unsupported(e) => CodecError::UnsupportedFormat(format!("{format}: {e}")),
        other => CodecError::Decode(format!("{format}: {other}")),
    }
}

fn resize_dynamic(
    image: RawImage<DynamicImage>,
    width: u32,
    height: u32,
) -> Result<RawImage<DynamicImage>, CodecError> {
    if width == 0 || height == 0 {
        return Err(CodecError::Resize(format!(
            "invalid target size {width}x{height}"
        )));
    }
    let resized = image.pixels.resize_exact(width, height, FilterType::Lanczos3);
    Ok(RawImage {
        width: resized.width(),
        height: resized.height(),
        pixels: resized,
    })
}

/// Codec backed by libwebp (through the `webp` crate) for encoding.
#[derive(Debug, Default)]
pub struct LibwebpCodec;

impl LibwebpCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for LibwebpCodec {
    type Pixels = DynamicImage;

    fn name(&self) -> &'static str {
        "libwebp"
    }

    /// Probe-encode a single pixel to make sure the native encoder is usable.
    fn init(&self) -> Result<(), CodecError> {
        let probe = webp::Encoder::from_rgba(&[0, 0, 0, 255], 1, 1)
            .encode_simple(false, 75.0)
            .map_err(|e| CodecError::Init(format!("libwebp probe encode failed: {e:?}")))?;
        if probe.is_empty() {
            return Err(CodecError::Init(
                "libwebp probe encode produced no output".into(),
            ));
        }
        Ok(())
    }

    fn decode(
        &self,
        bytes: &[u8],
        format: SourceFormat,
    ) -> Result<RawImage<DynamicImage>, CodecError> {
        decode_dynamic(bytes, format)
    }

    fn resize(
        &self,
        image: RawImage<DynamicImage>,
        width: u32,
        height: u32,
    ) -> Result<RawImage<DynamicImage>, CodecError> {
        resize_dynamic(image, width, height)
    }

    fn encode(
        &self,
        image: &RawImage<DynamicImage>,
        params: EncodeParams,
    ) -> Result<Vec<u8>, CodecError> {
        let quality = params.quality.value() as f32;
        let encoded = if image.pixels.color().has_alpha() {
            let rgba = image.pixels.to_rgba8();
            webp::Encoder::from_rgba(&rgba, image.width, image.height)
                .encode_simple(params.lossless, quality)
        } else {
            let rgb = image.pixels.to_rgb8();
            webp::Encoder::from_rgb(&rgb, image.width, image.height)
                .encode_simple(params.lossless, quality)
        };
        encoded
            .map(|memory| memory.to_vec())
            .map_err(|e| CodecError::Encode(format!("libwebp: {e:?}")))
    }
}

/// Pure Rust codec: no native library, but the encoder is lossless only.
///
/// Lossy requests are encoded losslessly; the first one logs a warning.
#[derive(Debug, Default)]
pub struct ImageRsCodec {
    warned_lossy: AtomicBool,
}

impl ImageRsCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Codec for ImageRsCodec {
    type Pixels = DynamicImage;

    fn name(&self) -> &'static str {
        "image-rs"
    }

    fn decode(
        &self,
        bytes: &[u8],
        format: SourceFormat,
    ) -> Result<RawImage<DynamicImage>, CodecError> {
        decode_dynamic(bytes, format)
    }

    fn resize(
        &self,
        image: RawImage<DynamicImage>,
        width: u32,
        height: u32,
    ) -> Result<RawImage<DynamicImage>, CodecError> {
        resize_dynamic(image, width, height)
    }

    fn encode(
        &self,
        image: &RawImage<DynamicImage>,
        params: EncodeParams,
    ) -> Result<Vec<u8>, CodecError> {
        if !params.lossless && !self.warned_lossy.swap(true, Ordering::Relaxed) {
            log::warn!(
                "the image-rs codec only writes lossless WebP; quality {} is ignored",
                params.quality.value()
            );
        }

        // The encoder accepts 8-bit RGB(A) and luma only.
        let normalized = if image.pixels.color().has_alpha() {
            DynamicImage::ImageRgba8(image.pixels.to_rgba8())
        } else {
            DynamicImage::ImageRgb8(image.pixels.to_rgb8())
        };

        let mut buf = Vec::new();
        normalized
            .write_with_encoder(WebPEncoder::new_lossless(&mut buf))
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(buf)
    }
}

/// Which production backend to use. Selected by `conversion.codec` in the config
/// or `--codec` on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodecKind {
    #[default]
    Libwebp,
    ImageRs,
}

impl FromStr for CodecKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "libwebp" => Ok(Self::Libwebp),
            "image-rs" => Ok(Self::ImageRs),
            other => Err(format!(
                "unknown codec '{other}' (expected libwebp or image-rs)"
            )),
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Libwebp => "libwebp",
            Self::ImageRs => "image-rs",
        })
    }
}

/// Runtime-selected backend. Lets callers stay generic over [`Codec`] while
/// the choice comes from configuration.
#[derive(Debug)]
pub enum CodecBackend {
    Libwebp(LibwebpCodec),
    ImageRs(ImageRsCodec),
}

impl CodecBackend {
    pub fn from_kind(kind: CodecKind) -> Self {
        match kind {
            CodecKind::Libwebp => Self::Libwebp(LibwebpCodec::new()),
            CodecKind::ImageRs => Self::ImageRs(ImageRsCodec::new()),
        }
    }
}

impl Codec for CodecBackend {
    type Pixels = DynamicImage;

    fn name(&self) -> &'static str {
        match self {
            Self::Libwebp(c) => c.name(),
            Self::ImageRs(c) => c.name(),
        }
    }

    fn init(&self) -> Result<(), CodecError> {
        match self {
            Self::Libwebp(c) => c.init(),
            Self::ImageRs(c) => c.init(),
        }
    }

    fn decode(
        &self,
        bytes: &[u8],
        format: SourceFormat,
    ) -> Result<RawImage<DynamicImage>, CodecError> {
        match self {
            Self::Libwebp(c) => c.decode(bytes, format),
            Self::ImageRs(c) => c.decode(bytes, format),
        }
    }

    fn resize(
        &self,
        image: RawImage<DynamicImage>,
        width: u32,
        height: u32,
    ) -> Result<RawImage<DynamicImage>, CodecError> {
        match self {
            Self::Libwebp(c) => c.resize(image, width, height),
            Self::ImageRs(c) => c.resize(image, width, height),
        }
    }

    fn encode(
        &self,
        image: &RawImage<DynamicImage>,
        params: EncodeParams,
    ) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Libwebp(c) => c.encode(image, params),
            Self::ImageRs(c) => c.encode(image, params),
        }
    }
}
