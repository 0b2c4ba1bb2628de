//! Single-image conversion.
//!
//! [`convert_image`] combines the dimension policy with codec execution:
//! decode, compute the target size, resize only when needed, encode. It never
//! touches the filesystem; callers hand it bytes and get bytes back.

use super::backend::{Codec, CodecError, Dimensions};
use super::calculations::calculate_target_dimensions;
use super::params::{ConvertOptions, EncodeParams};
use crate::types::SourceFormat;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("conversion cancelled")]
    Cancelled,
}

/// Shared flag a caller flips to abandon a conversion.
///
/// Checked between stages; a stage already running finishes first.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of converting one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub original: Dimensions,
    pub converted: Dimensions,
    /// Size of the input bytes.
    pub original_size: u64,
    /// Size of the encoded WebP.
    pub converted_size: u64,
    /// Whether the codec's resize ran.
    pub resized: bool,
    pub encoded: Vec<u8>,
}

fn check(cancel: Option<&CancellationToken>) -> Result<(), ConvertError> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(ConvertError::Cancelled),
        _ => Ok(()),
    }
}

/// Convert one image to WebP.
///
/// Quality and scale arrive already clamped by their newtypes; `max_dimension`
/// is clamped to at least 1 here.
pub fn convert_image<C: Codec>(
    codec: &C,
    bytes: &[u8],
    format: SourceFormat,
    options: &ConvertOptions,
    cancel: Option<&CancellationToken>,
) -> Result<Conversion, ConvertError> {
    check(cancel)?;
    log::debug!("{}: decoding {} bytes of {format}", codec.name(), bytes.len());
    let image = codec.decode(bytes, format)?;
    let original = image.dimensions();

    let (width, height) = calculate_target_dimensions(
        original.as_tuple(),
        options.scale,
        options.max_dimension.max(1),
    );
    let resized = (width, height) != original.as_tuple();

    check(cancel)?;
    let image = if resized {
        log::debug!("{}: resizing {original} to {width}x{height}", codec.name());
        codec.resize(image, width, height)?
    } else {
        image
    };
    let converted = image.dimensions();

    check(cancel)?;
    let params = EncodeParams {
        quality: options.quality,
        lossless: options.lossless,
    };
    log::debug!(
        "{}: encoding {converted} (quality {}, lossless {})",
        codec.name(),
        params.quality.value(),
        params.lossless
    );
    let encoded = codec.encode(&image, params)?;

    Ok(Conversion {
        original,
        converted,
        original_size: bytes.len() as u64,
        converted_size: encoded.len() as u64,
        resized,
        encoded,
    })
}
