//! Margin alignment marks and the identifier grid built from them.
//!
//! Small printed rectangles run down the right margin of the page. Their
//! centers, sorted top to bottom, anchor a 9x10 digit grid: the 3rd and
//! 12th marks define two anchor points (each with a column-specific
//! horizontal offset compensating printing drift), and grid coordinates
//! are interpolated linearly and independently in x and y between them.

use image::RgbImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::filter::gaussian_blur_f32;

use crate::error::OmrError;
use crate::geometry::{polygon_area, Corner};
use crate::threshold::{binarize_inverted, otsu_level};
use crate::template::{IdentifierTemplate, TemplatePoint, ID_COLUMNS, ID_ROWS};

/// Configuration for identifier-grid construction and sampling.
///
/// The anchor offsets are calibration constants tied to one physical
/// sheet layout's print geometry, not universal values.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IdentifierConfig {
    /// Fraction of the image width searched at the right edge.
    pub margin_frac: f32,
    /// Minimum contour area for a mark candidate (px^2).
    pub min_mark_area: f64,
    /// Marks required before the grid can be anchored.
    pub min_marks: usize,
    /// Gaussian sigma applied to the margin crop before thresholding.
    pub mark_blur_sigma: f32,
    /// Indices (top-to-bottom order) of the two anchor marks.
    pub anchor_first: usize,
    pub anchor_last: usize,
    /// Horizontal offsets applied to the anchor centers (pixels).
    pub anchor_offset_first: i32,
    pub anchor_offset_last: i32,
    /// Half side of the square sampling window per grid point (pixels).
    pub sample_radius: i32,
    /// Gaussian sigma applied to each sampled window before averaging.
    pub sample_blur_sigma: f32,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            margin_frac: 0.05,
            min_mark_area: 1000.0,
            min_marks: 12,
            mark_blur_sigma: 1.1,
            anchor_first: 2,
            anchor_last: 11,
            anchor_offset_first: -588,
            anchor_offset_last: -103,
            sample_radius: 10,
            sample_blur_sigma: 0.8,
        }
    }
}

/// A detected margin mark in full-page coordinates.
#[derive(Debug, Clone, Copy)]
pub struct AlignmentMark {
    pub cx: i32,
    pub cy: i32,
    pub width: u32,
    pub height: u32,
}

/// Detect alignment marks in the right page margin, sorted top to bottom.
pub fn find_alignment_marks(image: &RgbImage, config: &IdentifierConfig) -> Vec<AlignmentMark> {
    let (w, h) = image.dimensions();
    let crop_x = (w as f32 * (1.0 - config.margin_frac)) as u32;
    if crop_x >= w {
        return Vec::new();
    }
    let margin = image::imageops::crop_imm(image, crop_x, 0, w - crop_x, h).to_image();
    let gray = image::imageops::grayscale(&margin);
    let blurred = gaussian_blur_f32(&gray, config.mark_blur_sigma);
    let binary = binarize_inverted(&blurred, otsu_level(&blurred));

    let mut marks = Vec::new();
    for contour in find_contours::<i32>(&binary) {
        if contour.border_type != BorderType::Outer {
            continue;
        }
        let points: Vec<Corner> = contour
            .points
            .iter()
            .map(|p| Corner::new(p.x as f32, p.y as f32))
            .collect();
        if polygon_area(&points) <= config.min_mark_area {
            continue;
        }
        let (mut x0, mut y0, mut x1, mut y1) = (i32::MAX, i32::MAX, i32::MIN, i32::MIN);
        for p in &contour.points {
            x0 = x0.min(p.x);
            y0 = y0.min(p.y);
            x1 = x1.max(p.x);
            y1 = y1.max(p.y);
        }
        let box_w = (x1 - x0) as u32;
        let box_h = (y1 - y0) as u32;
        marks.push(AlignmentMark {
            cx: x0 + (box_w / 2) as i32 + crop_x as i32,
            cy: y0 + (box_h / 2) as i32,
            width: box_w,
            height: box_h,
        });
    }
    marks.sort_by_key(|m| m.cy);
    marks
}

/// The 9x10 identifier coordinate grid, row-major (index = row * 9 + col).
#[derive(Debug, Clone)]
pub struct IdentifierGrid {
    points: Vec<TemplatePoint>,
}

impl IdentifierGrid {
    /// Interpolate the grid between the two configured anchor marks.
    pub fn from_marks(
        marks: &[AlignmentMark],
        config: &IdentifierConfig,
    ) -> Result<Self, OmrError> {
        // Both anchors must exist even when min_marks is configured lower.
        let needed = config
            .min_marks
            .max(config.anchor_first.max(config.anchor_last) + 1);
        if marks.len() < needed {
            return Err(OmrError::InsufficientAlignmentMarks {
                found: marks.len(),
                needed,
            });
        }
        let first = marks[config.anchor_first];
        let last = marks[config.anchor_last];
        let start = (
            (first.cx + config.anchor_offset_first) as f32,
            first.cy as f32,
        );
        let end = ((last.cx + config.anchor_offset_last) as f32, last.cy as f32);

        let ys = linspace(start.1, end.1, ID_ROWS);
        let xs = linspace(start.0, end.0, ID_COLUMNS);
        let mut points = Vec::with_capacity(ID_ROWS * ID_COLUMNS);
        for &y in &ys {
            for &x in &xs {
                points.push(TemplatePoint {
                    x: x.round() as i32,
                    y: y.round() as i32,
                });
            }
        }
        Ok(Self { points })
    }

    /// Use a pre-calibrated 90-row template instead of detected marks.
    pub fn from_template(template: &IdentifierTemplate) -> Self {
        Self {
            points: template.points().to_vec(),
        }
    }

    pub fn points(&self) -> &[TemplatePoint] {
        &self.points
    }

    /// Grid points per digit column (index mod 9), each sorted by y.
    pub fn columns(&self) -> Vec<Vec<TemplatePoint>> {
        let mut columns: Vec<Vec<TemplatePoint>> = vec![Vec::with_capacity(ID_ROWS); ID_COLUMNS];
        for (index, point) in self.points.iter().enumerate() {
            columns[index % ID_COLUMNS].push(*point);
        }
        for column in &mut columns {
            column.sort_by_key(|p| p.y);
        }
        columns
    }
}

/// Detect marks and build the grid in one step.
pub fn build_identifier_grid(
    image: &RgbImage,
    config: &IdentifierConfig,
) -> Result<IdentifierGrid, OmrError> {
    let marks = find_alignment_marks(image, config);
    IdentifierGrid::from_marks(&marks, config)
}

/// `n` evenly spaced values from `a` to `b` inclusive.
fn linspace(a: f32, b: f32, n: usize) -> Vec<f32> {
    if n == 1 {
        return vec![a];
    }
    let step = (b - a) / (n - 1) as f32;
    (0..n).map(|i| a + step * i as f32).collect()
}
