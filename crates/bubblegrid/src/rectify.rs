//! Perspective rectification into the canonical frame.
//!
//! The ordered reference-frame corners are mapped onto an axis-aligned
//! rectangle sized from the longest opposing edges, and the page is
//! resampled bilinearly into that rectangle. All template coordinates
//! downstream live in this canonical space.

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

use crate::error::OmrError;
use crate::geometry::Quad;

/// Warp the source image into the canonical frame defined by `quad`.
pub fn rectify(image: &RgbImage, quad: &Quad) -> Result<RgbImage, OmrError> {
    let ordered = quad.ordered();
    let (width, height) = ordered.canonical_size()?;

    let src: [(f32, f32); 4] = [
        (ordered.corners[0].x, ordered.corners[0].y),
        (ordered.corners[1].x, ordered.corners[1].y),
        (ordered.corners[2].x, ordered.corners[2].y),
        (ordered.corners[3].x, ordered.corners[3].y),
    ];
    let dst: [(f32, f32); 4] = [
        (0.0, 0.0),
        (width as f32 - 1.0, 0.0),
        (width as f32 - 1.0, height as f32 - 1.0),
        (0.0, height as f32 - 1.0),
    ];

    let projection = Projection::from_control_points(src, dst).ok_or(
        OmrError::DegenerateQuad { width, height },
    )?;

    let mut canonical = RgbImage::new(width, height);
    warp_into(
        image,
        &projection,
        Interpolation::Bilinear,
        Rgb([0, 0, 0]),
        &mut canonical,
    );
    Ok(canonical)
}
