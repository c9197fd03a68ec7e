//! Quadrilateral ordering and small polygon utilities.
//!
//! Contour handling works on plain point lists: shoelace area, perimeter,
//! and Douglas-Peucker simplification for closed boundaries. Keeping these
//! local avoids coupling the frame locator to any one contour source.

use nalgebra::Point2;

use crate::error::OmrError;

/// A corner in image-pixel coordinates.
pub type Corner = Point2<f32>;

/// Four corners of the printed reference frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub corners: [Corner; 4],
}

impl Quad {
    pub fn new(corners: [Corner; 4]) -> Self {
        Self { corners }
    }

    /// Axis-aligned quad from a bounding rectangle.
    pub fn from_rect(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            corners: [
                Corner::new(x, y),
                Corner::new(x + width, y),
                Corner::new(x + width, y + height),
                Corner::new(x, y + height),
            ],
        }
    }

    /// Order corners as [top-left, top-right, bottom-right, bottom-left].
    ///
    /// Top-left/bottom-right carry the minimal/maximal coordinate sum,
    /// top-right/bottom-left the maximal/minimal x-y difference. Ordering
    /// is idempotent: applying it to its own output is a no-op.
    pub fn ordered(&self) -> Quad {
        let pick = |key: fn(&Corner) -> f32, max: bool| -> Corner {
            let mut best = self.corners[0];
            let mut best_key = key(&best);
            for c in &self.corners[1..] {
                let k = key(c);
                if (max && k > best_key) || (!max && k < best_key) {
                    best = *c;
                    best_key = k;
                }
            }
            best
        };
        let sum = |c: &Corner| c.x + c.y;
        let diff = |c: &Corner| c.x - c.y;
        Quad {
            corners: [
                pick(sum, false),
                pick(diff, true),
                pick(sum, true),
                pick(diff, false),
            ],
        }
    }

    /// Canonical frame size implied by the ordered corners.
    ///
    /// Width is the longer of the two horizontal edges, height the longer
    /// of the two vertical edges, both floored to integer pixels. Fails
    /// when either resolves to zero.
    pub fn canonical_size(&self) -> Result<(u32, u32), OmrError> {
        let [tl, tr, br, bl] = self.ordered().corners;
        let width = (br - bl).norm().max((tr - tl).norm()) as u32;
        let height = (tr - br).norm().max((tl - bl).norm()) as u32;
        if width == 0 || height == 0 {
            return Err(OmrError::DegenerateQuad { width, height });
        }
        Ok((width, height))
    }
}

/// Signed shoelace area of a closed polygon, returned as its absolute value.
pub fn polygon_area(points: &[Corner]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut acc = 0.0f64;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        acc += a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64;
    }
    acc.abs() / 2.0
}

/// Perimeter of a polygon; closes the loop when `closed` is set.
pub fn arc_length(points: &[Corner], closed: bool) -> f32 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut acc: f32 = points.windows(2).map(|w| (w[1] - w[0]).norm()).sum();
    if closed {
        acc += (points[0] - points[points.len() - 1]).norm();
    }
    acc
}

/// Simplify a closed boundary with Douglas-Peucker.
///
/// The cycle is split at the point farthest from the start so both arcs
/// have stable endpoints, then each arc is simplified independently.
pub fn simplify_closed(points: &[Corner], epsilon: f32) -> Vec<Corner> {
    if points.len() <= 3 {
        return points.to_vec();
    }

    let start = points[0];
    let mut split = 1;
    let mut best = 0.0f32;
    for (i, p) in points.iter().enumerate().skip(1) {
        let d = (p - start).norm_squared();
        if d > best {
            best = d;
            split = i;
        }
    }

    let mut first_arc = Vec::new();
    douglas_peucker(&points[..=split], epsilon, &mut first_arc);

    let mut back: Vec<Corner> = points[split..].to_vec();
    back.push(points[0]);
    let mut second_arc = Vec::new();
    douglas_peucker(&back, epsilon, &mut second_arc);

    // Merge, dropping the duplicated junction points.
    let mut out = first_arc;
    out.extend_from_slice(&second_arc[1..second_arc.len() - 1]);
    out
}

fn douglas_peucker(points: &[Corner], epsilon: f32, out: &mut Vec<Corner>) {
    if points.len() <= 2 {
        out.extend_from_slice(points);
        return;
    }
    let (first, last) = (points[0], points[points.len() - 1]);
    let mut max_dist = 0.0f32;
    let mut index = 0;
    for (i, p) in points.iter().enumerate().take(points.len() - 1).skip(1) {
        let d = point_segment_distance(*p, first, last);
        if d > max_dist {
            max_dist = d;
            index = i;
        }
    }
    if max_dist > epsilon {
        douglas_peucker(&points[..=index], epsilon, out);
        out.pop();
        douglas_peucker(&points[index..], epsilon, out);
    } else {
        out.push(first);
        out.push(last);
    }
}

fn point_segment_distance(p: Corner, a: Corner, b: Corner) -> f32 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < f32::EPSILON {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}
