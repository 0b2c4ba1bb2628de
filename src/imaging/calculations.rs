//! Pure calculation functions for output dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::ScalePercent;

/// Calculate the output dimensions for a conversion.
///
/// 1. Scale both edges by `scale` percent, rounding half away from zero.
///    At 100% the original dimensions are kept exactly.
/// 2. If either scaled edge exceeds `max_dimension`, shrink both so the longer
///    one equals `max_dimension`. The ratio preserved is that of the *scaled*
///    dimensions. On a tie, width is the controlling edge.
/// 3. Never return a zero edge.
///
/// # Arguments
/// * `original` - Decoded image dimensions (width, height)
/// * `scale` - Resize factor in percent
/// * `max_dimension` - Cap on either output edge (values below 1 act as 1)
///
/// # Examples
/// ```
/// # use webpify::imaging::{ScalePercent, calculate_target_dimensions};
/// assert_eq!(calculate_target_dimensions((1920, 1080), ScalePercent::new(50), 8000), (960, 540));
/// assert_eq!(calculate_target_dimensions((10000, 5000), ScalePercent::new(100), 8000), (8000, 4000));
/// ```
pub fn calculate_target_dimensions(
    original: (u32, u32),
    scale: ScalePercent,
    max_dimension: u32,
) -> (u32, u32) {
    let (orig_w, orig_h) = original;
    let max_dimension = u64::from(max_dimension.max(1));

    let (raw_w, raw_h) = if scale.is_identity() {
        (u64::from(orig_w), u64::from(orig_h))
    } else {
        (
            scale_edge(orig_w, scale.value()),
            scale_edge(orig_h, scale.value()),
        )
    };

    let (w, h) = if raw_w > max_dimension || raw_h > max_dimension {
        if raw_w >= raw_h {
            let h = (raw_h as f64 * max_dimension as f64 / raw_w as f64).round() as u64;
            (max_dimension, h)
        } else {
            let w = (raw_w as f64 * max_dimension as f64 / raw_h as f64).round() as u64;
            (w, max_dimension)
        }
    } else {
        (raw_w, raw_h)
    };

    (to_edge(w), to_edge(h))
}

/// `round(edge * percent / 100)`; the product is exact in f64 for any u32 inputs.
fn scale_edge(edge: u32, percent: u32) -> u64 {
    (f64::from(edge) * f64::from(percent) / 100.0).round() as u64
}

/// Clamp into `1..=u32::MAX`.
fn to_edge(value: u64) -> u32 {
    value.clamp(1, u64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(original: (u32, u32), scale: u32, max: u32) -> (u32, u32) {
        calculate_target_dimensions(original, ScalePercent::new(scale), max)
    }

    // =========================================================================
    // Scaling
    // =========================================================================

    #[test]
    fn identity_scale_keeps_dimensions() {
        assert_eq!(target((1920, 1080), 100, 8000), (1920, 1080));
    }

    #[test]
    fn half_scale() {
        assert_eq!(target((1920, 1080), 50, 8000), (960, 540));
        assert_eq!(target((400, 200), 50, 8000), (200, 100));
    }

    #[test]
    fn double_scale() {
        assert_eq!(target((640, 480), 200, 8000), (1280, 960));
    }

    #[test]
    fn rounds_half_away_from_zero() {
        // 3 * 0.5 = 1.5 → 2
        assert_eq!(target((3, 3), 50, 8000), (2, 2));
        // 101 * 0.5 = 50.5 → 51, 99 * 0.5 = 49.5 → 50
        assert_eq!(target((101, 99), 50, 8000), (51, 50));
    }

    #[test]
    fn never_returns_zero() {
        assert_eq!(target((1, 1), 1, 8000), (1, 1));
        assert_eq!(target((10, 1), 10, 8000), (1, 1));
    }

    // =========================================================================
    // Max-dimension clamp
    // =========================================================================

    #[test]
    fn clamps_wide_image_at_identity_scale() {
        assert_eq!(target((10000, 5000), 100, 8000), (8000, 4000));
    }

    #[test]
    fn clamps_tall_image() {
        assert_eq!(target((5000, 10000), 100, 8000), (4000, 8000));
    }

    #[test]
    fn clamp_uses_scaled_aspect_ratio() {
        // 6000x3000 @200% → 12000x6000 → 8000x4000
        assert_eq!(target((6000, 3000), 200, 8000), (8000, 4000));
    }

    #[test]
    fn clamp_square_tie_width_controls() {
        assert_eq!(target((9000, 9000), 100, 8000), (8000, 8000));
    }

    #[test]
    fn clamp_extreme_aspect_keeps_one_pixel() {
        assert_eq!(target((100_000, 1), 100, 8000), (8000, 1));
    }

    #[test]
    fn at_limit_is_not_clamped() {
        assert_eq!(target((8000, 100), 100, 8000), (8000, 100));
    }

    #[test]
    fn zero_max_dimension_acts_as_one() {
        assert_eq!(target((50, 20), 100, 0), (1, 1));
    }

    #[test]
    fn huge_scale_does_not_overflow() {
        assert_eq!(target((u32::MAX, u32::MAX), 200, 8000), (8000, 8000));
    }
}
