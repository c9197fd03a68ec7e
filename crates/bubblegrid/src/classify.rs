//! Fill scoring and option selection over the canonical frame.
//!
//! The canonical image is binarized once (Otsu, inverted so ink is
//! foreground) and every bubble window counts foreground pixels in a
//! square of side `2 * half_box` clipped to the image. The option with the
//! highest count wins; ties go to the earlier option so results are
//! deterministic. Without a minimum-fill threshold a blank question still
//! yields some letter (whichever window carries the most residual ink) —
//! a known limitation of count-based scoring.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::error::OmrError;
use crate::template::{CalibrationTemplate, TemplatePoint, OPTION_LETTERS};
use crate::threshold::{binarize_inverted, otsu_level};

/// Fill-classification options.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ClassifyConfig {
    /// Minimum foreground count for a winner; below it the question is
    /// reported unanswered. `None` always selects the maximum.
    pub min_fill: Option<u32>,
}

/// Clipped sampling window around a bubble center.
#[derive(Debug, Clone, Copy)]
struct Window {
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
}

impl Window {
    fn around(point: TemplatePoint, half_box: i32, width: u32, height: u32) -> Self {
        Self {
            x0: (point.x - half_box).max(0),
            y0: (point.y - half_box).max(0),
            x1: (point.x + half_box).min(width as i32),
            y1: (point.y + half_box).min(height as i32),
        }
    }

    fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }
}

/// Select one option letter per question group.
///
/// `None` entries mark questions whose best score fell below the
/// configured minimum fill.
pub fn classify_answers(
    canonical: &RgbImage,
    template: &CalibrationTemplate,
    config: &ClassifyConfig,
) -> Result<Vec<Option<char>>, OmrError> {
    let gray = image::imageops::grayscale(canonical);
    let binary = binarize_inverted(&gray, otsu_level(&gray));

    let mut answers = Vec::with_capacity(template.question_count());
    for group in template.groups() {
        let mut best_index = 0usize;
        let mut best_score = 0u32;
        for (index, point) in group.iter().enumerate() {
            let score = fill_score(&binary, *point, template.half_box())?;
            if index == 0 || score > best_score {
                best_index = index;
                best_score = score;
            }
        }
        let answered = config.min_fill.map_or(true, |min| best_score > min);
        answers.push(answered.then(|| OPTION_LETTERS[best_index]));
    }
    Ok(answers)
}

/// Foreground count inside the window around `point`.
fn fill_score(binary: &GrayImage, point: TemplatePoint, half_box: i32) -> Result<u32, OmrError> {
    let window = Window::around(point, half_box, binary.width(), binary.height());
    if window.is_empty() {
        return Err(OmrError::EmptySamplingWindow {
            x: point.x,
            y: point.y,
        });
    }
    let mut count = 0u32;
    for y in window.y0..window.y1 {
        for x in window.x0..window.x1 {
            if binary.get_pixel(x as u32, y as u32)[0] > 0 {
                count += 1;
            }
        }
    }
    Ok(count)
}

/// Annotated copy of the canonical image: every window outlined, the
/// winning window filled. Purely a debugging projection.
pub fn annotate_answers(
    canonical: &RgbImage,
    template: &CalibrationTemplate,
    answers: &[Option<char>],
) -> RgbImage {
    const OUTLINE: Rgb<u8> = Rgb([0, 200, 0]);
    const WINNER: Rgb<u8> = Rgb([220, 40, 40]);

    let mut out = canonical.clone();
    for (group, answer) in template.groups().zip(answers) {
        for (index, point) in group.iter().enumerate() {
            let window = Window::around(
                *point,
                template.half_box(),
                canonical.width(),
                canonical.height(),
            );
            if window.is_empty() {
                continue;
            }
            let rect = Rect::at(window.x0, window.y0)
                .of_size((window.x1 - window.x0) as u32, (window.y1 - window.y0) as u32);
            let selected = *answer == Some(OPTION_LETTERS[index]);
            if selected {
                draw_filled_rect_mut(&mut out, rect, WINNER);
            } else {
                draw_hollow_rect_mut(&mut out, rect, OUTLINE);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::GROUP_SIZE;

    const SPACING: i32 = 40;

    /// Template of `questions` rows, five options each, 40 px apart.
    fn make_template(questions: usize) -> CalibrationTemplate {
        let mut points = Vec::new();
        for q in 0..questions {
            for option in 0..GROUP_SIZE {
                points.push(TemplatePoint {
                    x: 60 + option as i32 * SPACING,
                    y: 60 + q as i32 * SPACING,
                });
            }
        }
        CalibrationTemplate::from_points(points).unwrap()
    }

    /// White canonical sheet with the chosen option blacked out per question.
    fn make_sheet(template: &CalibrationTemplate, marked: &[usize]) -> RgbImage {
        let mut img = RgbImage::from_pixel(320, 320, Rgb([255, 255, 255]));
        for (group, &choice) in template.groups().zip(marked) {
            let p = group[choice];
            for y in (p.y - 12)..(p.y + 12) {
                for x in (p.x - 12)..(p.x + 12) {
                    img.put_pixel(x as u32, y as u32, Rgb([0, 0, 0]));
                }
            }
        }
        img
    }

    #[test]
    fn test_selects_the_dark_bubble_in_every_group() {
        let template = make_template(4);
        let sheet = make_sheet(&template, &[0, 2, 4, 1]);
        let answers = classify_answers(&sheet, &template, &ClassifyConfig::default()).unwrap();
        let letters: Vec<char> = answers.into_iter().map(|a| a.unwrap()).collect();
        assert_eq!(letters, vec!['A', 'C', 'E', 'B']);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let template = make_template(3);
        let sheet = make_sheet(&template, &[1, 1, 3]);
        let config = ClassifyConfig::default();
        let first = classify_answers(&sheet, &template, &config).unwrap();
        let second = classify_answers(&sheet, &template, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_symmetric_tie_selects_earlier_option() {
        let template = make_template(1);
        // Mark options B and D with identical squares.
        let mut img = RgbImage::from_pixel(320, 320, Rgb([255, 255, 255]));
        for &choice in &[1usize, 3] {
            let p = template.points()[choice];
            for y in (p.y - 10)..(p.y + 10) {
                for x in (p.x - 10)..(p.x + 10) {
                    img.put_pixel(x as u32, y as u32, Rgb([0, 0, 0]));
                }
            }
        }
        let answers = classify_answers(&img, &template, &ClassifyConfig::default()).unwrap();
        assert_eq!(answers, vec![Some('B')]);
    }

    #[test]
    fn test_min_fill_leaves_blank_questions_unanswered() {
        let template = make_template(2);
        // Only question 0 has a mark.
        let sheet = make_sheet(&template, &[2]);
        let config = ClassifyConfig { min_fill: Some(50) };
        let answers = classify_answers(&sheet, &template, &config).unwrap();
        assert_eq!(answers[0], Some('C'));
        assert_eq!(answers[1], None);
    }

    #[test]
    fn test_window_fully_outside_is_an_error() {
        let template = CalibrationTemplate::from_points(
            (0..5)
                .map(|i| TemplatePoint {
                    x: 5000 + i * 40,
                    y: 5000,
                })
                .collect(),
        )
        .unwrap();
        let sheet = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
        assert!(matches!(
            classify_answers(&sheet, &template, &ClassifyConfig::default()),
            Err(OmrError::EmptySamplingWindow { .. })
        ));
    }

    #[test]
    fn test_annotation_preserves_dimensions() {
        let template = make_template(2);
        let sheet = make_sheet(&template, &[0, 4]);
        let answers = classify_answers(&sheet, &template, &ClassifyConfig::default()).unwrap();
        let annotated = annotate_answers(&sheet, &template, &answers);
        assert_eq!(annotated.dimensions(), sheet.dimensions());
        // Source image untouched.
        assert_eq!(sheet.get_pixel(0, 0), &Rgb([255, 255, 255]));
    }
}
