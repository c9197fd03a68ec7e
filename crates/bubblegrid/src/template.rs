//! Calibration templates: bubble coordinates in canonical space.
//!
//! A template is a two-column CSV (`x,y` header) produced by an external,
//! human-driven calibration step; the pipeline only ever reads it. Rows are
//! ordered question-major, option-minor, so each consecutive run of five
//! rows is one question's A..E option set. The half-box sampling radius is
//! derived from the first row's horizontal spacing, which assumes uniform
//! spacing within a row.

use std::path::Path;

use crate::error::OmrError;

/// Options per question group, in fixed order.
pub const GROUP_SIZE: usize = 5;

/// Option letters, index-aligned with a group's coordinates.
pub const OPTION_LETTERS: [char; GROUP_SIZE] = ['A', 'B', 'C', 'D', 'E'];

/// Identifier grid shape: 9 digit columns, 10 digit values each.
pub const ID_COLUMNS: usize = 9;
pub const ID_ROWS: usize = 10;

/// One bubble center in canonical (or page) pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TemplatePoint {
    pub x: i32,
    pub y: i32,
}

/// Ordered bubble coordinates for the answer region.
#[derive(Debug, Clone)]
pub struct CalibrationTemplate {
    points: Vec<TemplatePoint>,
    half_box: i32,
}

impl CalibrationTemplate {
    /// Load from a `x,y` CSV file.
    pub fn load(path: &Path) -> Result<Self, OmrError> {
        Self::from_points(read_point_csv(path)?).map_err(|reason| OmrError::InvalidTemplate {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Build from an in-memory coordinate list.
    pub fn from_points(points: Vec<TemplatePoint>) -> Result<Self, String> {
        if points.is_empty() || points.len() % GROUP_SIZE != 0 {
            return Err(format!(
                "row count {} is not a positive multiple of {}",
                points.len(),
                GROUP_SIZE
            ));
        }
        let half_box = derive_half_box(&points);
        Ok(Self { points, half_box })
    }

    /// Write back out in the same CSV format. `save` then [`Self::load`]
    /// reproduces an identical coordinate list.
    pub fn save(&self, path: &Path) -> Result<(), OmrError> {
        write_point_csv(path, &self.points)
    }

    pub fn points(&self) -> &[TemplatePoint] {
        &self.points
    }

    /// Consecutive runs of five coordinates, one per question.
    pub fn groups(&self) -> std::slice::ChunksExact<'_, TemplatePoint> {
        self.points.chunks_exact(GROUP_SIZE)
    }

    pub fn question_count(&self) -> usize {
        self.points.len() / GROUP_SIZE
    }

    /// Half the mean horizontal spacing of the first four consecutive
    /// coordinate gaps; sizes the square sampling window per bubble.
    pub fn half_box(&self) -> i32 {
        self.half_box
    }
}

/// Bubble coordinates for the identifier region, exactly 9 x 10 entries,
/// row-major with column = index mod 9. An alternative to anchoring the
/// identifier grid on detected alignment marks.
#[derive(Debug, Clone)]
pub struct IdentifierTemplate {
    points: Vec<TemplatePoint>,
}

impl IdentifierTemplate {
    pub fn load(path: &Path) -> Result<Self, OmrError> {
        let points = read_point_csv(path)?;
        let expected = ID_COLUMNS * ID_ROWS;
        if points.len() != expected {
            return Err(OmrError::InvalidTemplate {
                path: path.to_path_buf(),
                reason: format!("expected exactly {} rows, got {}", expected, points.len()),
            });
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[TemplatePoint] {
        &self.points
    }
}

fn derive_half_box(points: &[TemplatePoint]) -> i32 {
    // First four gaps of the first option row; assumes uniform spacing.
    let gaps: i32 = points
        .windows(2)
        .take(4)
        .map(|w| w[1].x - w[0].x)
        .sum();
    ((gaps as f64 / 4.0) as i32) / 2
}

fn read_point_csv(path: &Path) -> Result<Vec<TemplatePoint>, OmrError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| OmrError::InvalidTemplate {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut points = Vec::new();
    for (index, row) in reader.deserialize::<TemplatePoint>().enumerate() {
        let point = row.map_err(|e| OmrError::InvalidTemplate {
            path: path.to_path_buf(),
            reason: format!("row {}: {}", index + 1, e),
        })?;
        points.push(point);
    }
    Ok(points)
}

fn write_point_csv(path: &Path, points: &[TemplatePoint]) -> Result<(), OmrError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| OmrError::InvalidTemplate {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    for point in points {
        writer.serialize(point).map_err(|e| OmrError::InvalidTemplate {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    }
    writer.flush().map_err(|e| OmrError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn five_across(y: i32) -> Vec<TemplatePoint> {
        (0..5)
            .map(|i| TemplatePoint {
                x: 100 + i * 40,
                y,
            })
            .collect()
    }

    #[test]
    fn test_half_box_from_uniform_spacing() {
        let template = CalibrationTemplate::from_points(five_across(50)).unwrap();
        assert_eq!(template.half_box(), 20);
        assert_eq!(template.question_count(), 1);
    }

    #[test]
    fn test_rejects_partial_group() {
        let mut points = five_across(50);
        points.pop();
        assert!(CalibrationTemplate::from_points(points).is_err());
        assert!(CalibrationTemplate::from_points(Vec::new()).is_err());
    }

    #[test]
    fn test_round_trip_preserves_points() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bubbles.csv");

        let mut points = five_across(50);
        points.extend(five_across(90));
        let template = CalibrationTemplate::from_points(points.clone()).unwrap();
        template.save(&path).unwrap();

        let reloaded = CalibrationTemplate::load(&path).unwrap();
        assert_eq!(reloaded.points(), points.as_slice());
        assert_eq!(reloaded.half_box(), template.half_box());
    }

    #[test]
    fn test_load_rejects_non_integer_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "x,y\n10,20\n30,forty\n50,60\n70,80\n90,100\n").unwrap();
        match CalibrationTemplate::load(&path) {
            Err(OmrError::InvalidTemplate { reason, .. }) => {
                assert!(reason.contains("row 2"), "reason: {}", reason)
            }
            other => panic!("expected InvalidTemplate, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_identifier_template_requires_90_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id.csv");
        let mut body = String::from("x,y\n");
        for i in 0..89 {
            body.push_str(&format!("{},{}\n", i, i));
        }
        std::fs::write(&path, &body).unwrap();
        assert!(IdentifierTemplate::load(&path).is_err());

        body.push_str("89,89\n");
        std::fs::write(&path, &body).unwrap();
        assert_eq!(IdentifierTemplate::load(&path).unwrap().points().len(), 90);
    }
}
