//! RGB to HSV conversion for hue-band masking.
//!
//! The printed reference frame is red, which wraps around 0° in hue, so a
//! mask over it needs two disjoint bands (near 0° and near 360°) combined
//! with saturation and value floors to reject paper and faint ink.

/// Hue in degrees [0, 360), saturation and value in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    pub h: f32,
    pub s: f32,
    pub v: f32,
}

/// Convert an 8-bit RGB triple to HSV.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta < f32::EPSILON {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let s = if max < f32::EPSILON { 0.0 } else { delta / max };

    Hsv { h, s, v: max }
}

/// Test whether a pixel falls in either of two wrapping red-hue bands.
///
/// `hue_low_max` is the upper edge of the band starting at 0°,
/// `hue_high_min` the lower edge of the band ending at 360°.
pub fn in_red_bands(
    hsv: Hsv,
    hue_low_max: f32,
    hue_high_min: f32,
    min_saturation: f32,
    min_value: f32,
) -> bool {
    if hsv.s < min_saturation || hsv.v < min_value {
        return false;
    }
    hsv.h <= hue_low_max || hsv.h >= hue_high_min
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_primary_colors() {
        let red = rgb_to_hsv(255, 0, 0);
        assert_relative_eq!(red.h, 0.0, epsilon = 1e-4);
        assert_relative_eq!(red.s, 1.0, epsilon = 1e-4);
        assert_relative_eq!(red.v, 1.0, epsilon = 1e-4);

        let green = rgb_to_hsv(0, 255, 0);
        assert_relative_eq!(green.h, 120.0, epsilon = 1e-4);

        let blue = rgb_to_hsv(0, 0, 255);
        assert_relative_eq!(blue.h, 240.0, epsilon = 1e-4);
    }

    #[test]
    fn test_gray_has_zero_saturation() {
        let gray = rgb_to_hsv(128, 128, 128);
        assert_relative_eq!(gray.s, 0.0, epsilon = 1e-6);
        assert_relative_eq!(gray.v, 128.0 / 255.0, epsilon = 1e-4);
    }

    #[test]
    fn test_wrapped_red_is_accepted() {
        // Slightly bluish red lands just below 360 degrees.
        let hsv = rgb_to_hsv(220, 20, 40);
        assert!(in_red_bands(hsv, 30.0, 320.0, 0.3, 0.2));
        // Paper white fails on saturation.
        let white = rgb_to_hsv(250, 250, 250);
        assert!(!in_red_bands(white, 30.0, 320.0, 0.3, 0.2));
        // Dark ink fails on value.
        let ink = rgb_to_hsv(30, 5, 5);
        assert!(!in_red_bands(ink, 30.0, 320.0, 0.3, 0.2));
    }
}
