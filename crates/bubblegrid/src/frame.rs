//! Reference-frame location: find the printed red rectangle on a page.
//!
//! A binary mask selects two wrapping red-hue bands with saturation/value
//! floors, is blurred to suppress speckle, edge-detected, and traced into
//! external contours. The single largest contour wins; candidates are
//! never averaged or merged. By default the boundary must simplify to
//! exactly four vertices; when a minimum expected frame size is known in
//! advance, a looser bounding-box fallback accepts any large-enough blob.

use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;

use crate::color::{in_red_bands, rgb_to_hsv};
use crate::error::OmrError;
use crate::geometry::{arc_length, polygon_area, simplify_closed, Corner, Quad};

/// Configuration for reference-frame location. All values that were
/// scattered constants in earlier tooling live here.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FrameConfig {
    /// Upper edge of the red band starting at 0 (degrees).
    pub hue_low_max: f32,
    /// Lower edge of the red band ending at 360 (degrees).
    pub hue_high_min: f32,
    /// Minimum saturation for a mask pixel, in [0, 1].
    pub min_saturation: f32,
    /// Minimum value for a mask pixel, in [0, 1].
    pub min_value: f32,
    /// Gaussian sigma applied to the mask before edge detection.
    pub mask_blur_sigma: f32,
    /// Canny hysteresis thresholds.
    pub canny_low: f32,
    pub canny_high: f32,
    /// Minimum enclosed area for a frame candidate (px^2).
    pub min_area: f64,
    /// Polygon simplification tolerance as a fraction of the perimeter.
    pub approx_eps_frac: f32,
    /// Minimum expected frame size; enables the bounding-box fallback.
    pub min_size: Option<(u32, u32)>,
    /// Padding applied when the fallback box is expanded (pixels).
    pub pad: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            hue_low_max: 30.0,
            hue_high_min: 320.0,
            min_saturation: 100.0 / 255.0,
            min_value: 50.0 / 255.0,
            mask_blur_sigma: 1.1,
            canny_low: 30.0,
            canny_high: 100.0,
            min_area: 1000.0,
            approx_eps_frac: 0.04,
            min_size: None,
            pad: 20,
        }
    }
}

/// Binary mask of pixels inside the configured red-hue bands.
pub fn red_mask(image: &RgbImage, config: &FrameConfig) -> GrayImage {
    let mut mask = GrayImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(mask.pixels_mut()) {
        let hsv = rgb_to_hsv(src[0], src[1], src[2]);
        let hit = in_red_bands(
            hsv,
            config.hue_low_max,
            config.hue_high_min,
            config.min_saturation,
            config.min_value,
        );
        *dst = Luma([if hit { 255 } else { 0 }]);
    }
    mask
}

/// Locate the reference frame and return its four corners.
///
/// Fails with [`OmrError::NoReferenceFrame`] when no red contour exists
/// and [`OmrError::AmbiguousReferenceFrame`] when the best candidate is
/// too small or does not resolve to four vertices.
pub fn locate_frame(image: &RgbImage, config: &FrameConfig) -> Result<Quad, OmrError> {
    let mask = red_mask(image, config);
    let blurred = gaussian_blur_f32(&mask, config.mask_blur_sigma);
    let edges = canny(&blurred, config.canny_low, config.canny_high);

    let contours = find_contours::<i32>(&edges);
    let mut best: Option<(f64, Vec<Corner>)> = None;
    for contour in &contours {
        if contour.border_type != BorderType::Outer {
            continue;
        }
        let points: Vec<Corner> = contour
            .points
            .iter()
            .map(|p| Corner::new(p.x as f32, p.y as f32))
            .collect();
        let area = polygon_area(&points);
        if best.as_ref().map_or(true, |(a, _)| area > *a) {
            best = Some((area, points));
        }
    }

    let (area, boundary) = best.ok_or(OmrError::NoReferenceFrame)?;
    if area < config.min_area {
        // Report polygon vertices, not raw traced-boundary points.
        let epsilon = config.approx_eps_frac * arc_length(&boundary, true);
        return Err(OmrError::AmbiguousReferenceFrame {
            vertices: simplify_closed(&boundary, epsilon).len(),
            area,
        });
    }

    if let Some((min_w, min_h)) = config.min_size {
        return Ok(bounding_box_fallback(
            &boundary,
            image.width(),
            image.height(),
            min_w,
            min_h,
            config.pad,
        ));
    }

    let epsilon = config.approx_eps_frac * arc_length(&boundary, true);
    let approx = simplify_closed(&boundary, epsilon);
    if approx.len() != 4 {
        return Err(OmrError::AmbiguousReferenceFrame {
            vertices: approx.len(),
            area,
        });
    }
    Ok(Quad::new([approx[0], approx[1], approx[2], approx[3]]))
}

/// Relaxed variant: the candidate's axis-aligned bounding box, padded and
/// grown to the expected minimum size when the detection came in small.
fn bounding_box_fallback(
    boundary: &[Corner],
    image_w: u32,
    image_h: u32,
    min_w: u32,
    min_h: u32,
    pad: u32,
) -> Quad {
    let mut x0 = f32::MAX;
    let mut y0 = f32::MAX;
    let mut x1 = f32::MIN;
    let mut y1 = f32::MIN;
    for p in boundary {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    let mut x = x0;
    let mut y = y0;
    let mut w = x1 - x0;
    let mut h = y1 - y0;

    if w < min_w as f32 || h < min_h as f32 {
        let pad = pad as f32;
        x = (x - pad).max(0.0);
        y = (y - pad).max(0.0);
        w = (w + 2.0 * pad).max(min_w as f32).min(image_w as f32 - x);
        h = (h + 2.0 * pad).max(min_h as f32).min(image_h as f32 - y);
    }
    Quad::from_rect(x, y, w, h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const RED: Rgb<u8> = Rgb([200, 20, 30]);
    const WHITE: Rgb<u8> = Rgb([250, 250, 250]);

    /// White page with a red rectangle outline of the given thickness.
    fn page_with_frame(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32, t: u32) -> RgbImage {
        let mut img = RgbImage::from_pixel(w, h, WHITE);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let on_border =
                    x < x0 + t || x + t > x1 || y < y0 + t || y + t > y1;
                if on_border {
                    img.put_pixel(x, y, RED);
                }
            }
        }
        img
    }

    #[test]
    fn test_locates_frame_on_clean_page() {
        let img = page_with_frame(500, 640, 60, 80, 440, 560, 4);
        let quad = locate_frame(&img, &FrameConfig::default()).unwrap();
        let ordered = quad.ordered();
        // Corners within a few pixels of the drawn rectangle.
        assert!((ordered.corners[0].x - 60.0).abs() < 8.0);
        assert!((ordered.corners[0].y - 80.0).abs() < 8.0);
        assert!((ordered.corners[2].x - 440.0).abs() < 8.0);
        assert!((ordered.corners[2].y - 560.0).abs() < 8.0);
    }

    #[test]
    fn test_blank_page_has_no_frame() {
        let img = RgbImage::from_pixel(200, 200, WHITE);
        assert!(matches!(
            locate_frame(&img, &FrameConfig::default()),
            Err(OmrError::NoReferenceFrame)
        ));
    }

    #[test]
    fn test_small_blob_is_ambiguous() {
        let mut img = RgbImage::from_pixel(200, 200, WHITE);
        for y in 90..100 {
            for x in 90..100 {
                img.put_pixel(x, y, RED);
            }
        }
        match locate_frame(&img, &FrameConfig::default()) {
            Err(OmrError::AmbiguousReferenceFrame { vertices, area }) => {
                // Simplified polygon count, not the dense boundary walk.
                assert!(vertices <= 8, "vertices = {}", vertices);
                assert!(area < 1000.0);
            }
            other => panic!("expected AmbiguousReferenceFrame, got {:?}", other),
        }
    }

    #[test]
    fn test_fallback_grows_to_minimum_size() {
        let img = page_with_frame(500, 640, 200, 200, 300, 300, 4);
        let config = FrameConfig {
            min_size: Some((200, 200)),
            ..FrameConfig::default()
        };
        let quad = locate_frame(&img, &config).unwrap();
        let (w, h) = quad.canonical_size().unwrap();
        assert!(w >= 200 && h >= 200, "fallback size {}x{}", w, h);
    }
}
