//! Parameter types for a conversion.
//!
//! These structs describe *what* to produce, not *how*. They sit between the
//! callers (CLI, HTTP, session), which may validate loosely, and the
//! [`operations`](super::operations) module, which relies on every value being
//! in range.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1-100, default 80). Clamped on construction.
//! - [`ScalePercent`]: Resize factor relative to the source (1-200, default 100). Clamped on construction.
//! - [`ConvertOptions`]: Everything one conversion needs besides the bytes.
//! - [`EncodeParams`]: What the codec's encoder receives.

/// Largest dimension WebP can store.
pub const WEBP_MAX_DIMENSION: u32 = 16383;

/// Default cap on either output dimension.
pub const DEFAULT_MAX_DIMENSION: u32 = 8000;

/// Quality setting for lossy WebP encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u32);

impl Quality {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 100;

    pub fn new(value: u32) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

impl From<u32> for Quality {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<Quality> for u32 {
    fn from(q: Quality) -> Self {
        q.0
    }
}

/// Resize factor in percent of the source dimensions (1-200). 100 means unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalePercent(u32);

impl ScalePercent {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 200;

    pub fn new(value: u32) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn is_identity(self) -> bool {
        self.0 == 100
    }
}

impl Default for ScalePercent {
    fn default() -> Self {
        Self(100)
    }
}

impl From<u32> for ScalePercent {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<ScalePercent> for u32 {
    fn from(s: ScalePercent) -> Self {
        s.0
    }
}

/// Options for converting a single image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOptions {
    pub quality: Quality,
    pub scale: ScalePercent,
    pub lossless: bool,
    /// Cap on either output dimension. Values below 1 are treated as 1.
    pub max_dimension: u32,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            quality: Quality::default(),
            scale: ScalePercent::default(),
            lossless: false,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

/// Encoder settings handed to the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub quality: Quality,
    pub lossless: bool,
}
