//! Codec trait and shared types.
//!
//! The [`Codec`] trait defines the operations every backend must support:
//! init, decode, resize and encode. Orchestration code (the single-image
//! converter, the batch runner, the HTTP service) is generic over it and never
//! touches pixels directly.
//!
//! Production implementations live in [`rust_backend`](super::rust_backend):
//!
//! | Backend | Decode | Resize | Encode |
//! |---|---|---|---|
//! | `LibwebpCodec` | `image` + rav1d | Lanczos3 | libwebp (lossy or lossless) |
//! | `ImageRsCodec` | `image` + rav1d | Lanczos3 | `image` WebP encoder (lossless only) |

use super::params::EncodeParams;
use crate::types::SourceFormat;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to resize image: {0}")]
    Resize(String),
    #[error("failed to encode WebP: {0}")]
    Encode(String),
    #[error("codec initialization failed: {0}")]
    Init(String),
}

/// Width and height of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A decoded image owned by one conversion call.
///
/// `P` is whatever the backend stores pixels in. The orchestration code only
/// reads `width` and `height`.
#[derive(Debug, Clone)]
pub struct RawImage<P> {
    pub width: u32,
    pub height: u32,
    pub pixels: P,
}

impl<P> RawImage<P> {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

/// Trait for codec backends.
///
/// `init` is called once per process through the
/// [`InitGate`](super::init::InitGate) before the first conversion; backends
/// with nothing to set up keep the default.
pub trait Codec: Send + Sync {
    /// Pixel storage for decoded images.
    type Pixels: Send;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// One-time setup, run before the first conversion.
    fn init(&self) -> Result<(), CodecError> {
        Ok(())
    }

    fn decode(
        &self,
        bytes: &[u8],
        format: SourceFormat,
    ) -> Result<RawImage<Self::Pixels>, CodecError>;

    /// Resize to exactly `width` x `height`.
    fn resize(
        &self,
        image: RawImage<Self::Pixels>,
        width: u32,
        height: u32,
    ) -> Result<RawImage<Self::Pixels>, CodecError>;

    fn encode(
        &self,
        image: &RawImage<Self::Pixels>,
        params: EncodeParams,
    ) -> Result<Vec<u8>, CodecError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::Quality;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock codec that records operations without touching pixels.
    ///
    /// Source "images" are ASCII `WIDTHxHEIGHT`, e.g. `b"1920x1080"`. Anything
    /// else fails to decode. Encoded output is a short ASCII description of the
    /// encode call, so its length is deterministic.
    /// Uses Mutex (not RefCell) so it is Sync like the real backends.
    #[derive(Default)]
    pub struct MockCodec {
        pub operations: Mutex<Vec<RecordedOp>>,
        pub fail_encode: bool,
        /// Number of initial `init` calls that fail before one succeeds.
        pub init_failures: AtomicUsize,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Init,
        Decode {
            format: SourceFormat,
            width: u32,
            height: u32,
        },
        Resize {
            from: (u32, u32),
            to: (u32, u32),
        },
        Encode {
            width: u32,
            height: u32,
            quality: u32,
            lossless: bool,
        },
    }

    impl MockCodec {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_encode() -> Self {
            Self {
                fail_encode: true,
                ..Self::default()
            }
        }

        pub fn failing_init(times: usize) -> Self {
            Self {
                init_failures: AtomicUsize::new(times),
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn resize_count(&self) -> usize {
            self.get_operations()
                .iter()
                .filter(|op| matches!(op, RecordedOp::Resize { .. }))
                .count()
        }

        /// The bytes `encode` produces for the given parameters.
        pub fn encoded_bytes(width: u32, height: u32, quality: Quality, lossless: bool) -> Vec<u8> {
            format!("WEBP {width}x{height} q{} {lossless}", quality.value()).into_bytes()
        }

        fn record(&self, op: RecordedOp) {
            self.operations.lock().unwrap().push(op);
        }
    }

    fn parse_mock_image(bytes: &[u8]) -> Option<(u32, u32)> {
        let text = std::str::from_utf8(bytes).ok()?;
        let (w, h) = text.trim().split_once('x')?;
        Some((w.parse().ok()?, h.parse().ok()?))
    }

    impl Codec for MockCodec {
        type Pixels = ();

        fn name(&self) -> &'static str {
            "mock"
        }

        fn init(&self) -> Result<(), CodecError> {
            self.record(RecordedOp::Init);
            let remaining = self.init_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.init_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(CodecError::Init("mock init failure".into()));
            }
            Ok(())
        }

        fn decode(&self, bytes: &[u8], format: SourceFormat) -> Result<RawImage<()>, CodecError> {
            let (width, height) = parse_mock_image(bytes)
                .ok_or_else(|| CodecError::Decode("not a mock image".into()))?;
            self.record(RecordedOp::Decode {
                format,
                width,
                height,
            });
            Ok(RawImage {
                width,
                height,
                pixels: (),
            })
        }

        fn resize(
            &self,
            image: RawImage<()>,
            width: u32,
            height: u32,
        ) -> Result<RawImage<()>, CodecError> {
            self.record(RecordedOp::Resize {
                from: (image.width, image.height),
                to: (width, height),
            });
            Ok(RawImage {
                width,
                height,
                pixels: (),
            })
        }

        fn encode(&self, image: &RawImage<()>, params: EncodeParams) -> Result<Vec<u8>, CodecError> {
            self.record(RecordedOp::Encode {
                width: image.width,
                height: image.height,
                quality: params.quality.value(),
                lossless: params.lossless,
            });
            if self.fail_encode {
                return Err(CodecError::Encode("mock encode failure".into()));
            }
            Ok(Self::encoded_bytes(
                image.width,
                image.height,
                params.quality,
                params.lossless,
            ))
        }
    }

    #[test]
    fn mock_decodes_dimension_text() {
        let codec = MockCodec::new();
        let image = codec.decode(b"800x600", SourceFormat::Png).unwrap();
        assert_eq!(image.dimensions(), Dimensions::new(800, 600));

        let ops = codec.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            &ops[0],
            RecordedOp::Decode {
                format: SourceFormat::Png,
                width: 800,
                height: 600
            }
        ));
    }

    #[test]
    fn mock_rejects_garbage() {
        let codec = MockCodec::new();
        let err = codec.decode(b"\x00\x01garbage", SourceFormat::Jpeg).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
        assert!(codec.get_operations().is_empty());
    }

    #[test]
    fn mock_records_resize_and_encode() {
        let codec = MockCodec::new();
        let image = codec.decode(b"400x200", SourceFormat::Png).unwrap();
        let resized = codec.resize(image, 200, 100).unwrap();
        let bytes = codec
            .encode(
                &resized,
                EncodeParams {
                    quality: Quality::new(90),
                    lossless: false,
                },
            )
            .unwrap();

        assert_eq!(bytes, b"WEBP 200x100 q90 false");
        assert_eq!(
            codec.get_operations()[1..],
            [
                RecordedOp::Resize {
                    from: (400, 200),
                    to: (200, 100)
                },
                RecordedOp::Encode {
                    width: 200,
                    height: 100,
                    quality: 90,
                    lossless: false
                }
            ]
        );
    }

    #[test]
    fn mock_init_fails_requested_number_of_times() {
        let codec = MockCodec::failing_init(1);
        assert!(codec.init().is_err());
        assert!(codec.init().is_ok());
    }

    #[test]
    fn dimensions_display() {
        assert_eq!(Dimensions::new(1920, 1080).to_string(), "1920x1080");
    }
}
