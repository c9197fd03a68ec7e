//! Digit selection over the identifier grid.
//!
//! Each of the nine columns holds ten bubbles for the digit values 0-9.
//! A small grayscale window around every grid point is blurred lightly and
//! averaged; the darkest row wins the column. Windows that fall entirely
//! outside the image score as infinitely unfilled so they are never
//! selected by mistake.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_circle_mut;
use imageproc::filter::gaussian_blur_f32;

use crate::marks::{IdentifierConfig, IdentifierGrid};
use crate::template::TemplatePoint;

/// Read the identifier digit string (one digit per column, left to right).
pub fn read_identifier(
    image: &RgbImage,
    grid: &IdentifierGrid,
    config: &IdentifierConfig,
) -> String {
    let gray = image::imageops::grayscale(image);
    let mut digits = String::with_capacity(grid.columns().len());
    for column in grid.columns() {
        let mut best_row = 0usize;
        let mut best_score = f32::INFINITY;
        for (row, point) in column.iter().enumerate() {
            let score = window_intensity(&gray, *point, config);
            if score < best_score {
                best_row = row;
                best_score = score;
            }
        }
        debug_assert!(best_row < 10);
        digits.push(char::from(b'0' + best_row as u8));
    }
    digits
}

/// Mean intensity of the blurred window around `point`; +inf when the
/// window lies fully outside the image.
fn window_intensity(gray: &GrayImage, point: TemplatePoint, config: &IdentifierConfig) -> f32 {
    let r = config.sample_radius;
    let x0 = (point.x - r).max(0);
    let y0 = (point.y - r).max(0);
    let x1 = (point.x + r).min(gray.width() as i32);
    let y1 = (point.y + r).min(gray.height() as i32);
    if x0 >= x1 || y0 >= y1 {
        return f32::INFINITY;
    }

    let window = image::imageops::crop_imm(
        gray,
        x0 as u32,
        y0 as u32,
        (x1 - x0) as u32,
        (y1 - y0) as u32,
    )
    .to_image();
    let blurred = gaussian_blur_f32(&window, config.sample_blur_sigma);
    let sum: u64 = blurred.pixels().map(|p| p[0] as u64).sum();
    sum as f32 / (blurred.width() * blurred.height()) as f32
}

/// Annotated copy with every grid point circled and winners highlighted.
pub fn annotate_identifier(
    image: &RgbImage,
    grid: &IdentifierGrid,
    digits: &str,
    config: &IdentifierConfig,
) -> RgbImage {
    const OTHER: Rgb<u8> = Rgb([220, 40, 40]);
    const WINNER: Rgb<u8> = Rgb([0, 200, 0]);

    let mut out = image.clone();
    let winners: Vec<usize> = digits
        .chars()
        .map(|c| c.to_digit(10).unwrap_or(0) as usize)
        .collect();
    for (col_index, column) in grid.columns().iter().enumerate() {
        for (row, point) in column.iter().enumerate() {
            let color = if winners.get(col_index) == Some(&row) {
                WINNER
            } else {
                OTHER
            };
            draw_hollow_circle_mut(&mut out, (point.x, point.y), config.sample_radius, color);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marks::{AlignmentMark, IdentifierConfig};
    use crate::template::{ID_COLUMNS, ID_ROWS};

    fn grid_and_config() -> (IdentifierGrid, IdentifierConfig) {
        let config = IdentifierConfig {
            anchor_offset_first: -500,
            anchor_offset_last: -104,
            ..IdentifierConfig::default()
        };
        let marks: Vec<AlignmentMark> = (0..12)
            .map(|i| AlignmentMark {
                cx: 900,
                cy: 100 + 45 * i,
                width: 60,
                height: 20,
            })
            .collect();
        let grid = IdentifierGrid::from_marks(&marks, &config).unwrap();
        (grid, config)
    }

    fn draw_dark_square(img: &mut RgbImage, p: TemplatePoint, half: i32) {
        for y in (p.y - half)..(p.y + half) {
            for x in (p.x - half)..(p.x + half) {
                if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
                    img.put_pixel(x as u32, y as u32, Rgb([20, 20, 20]));
                }
            }
        }
    }

    #[test]
    fn test_recovers_known_digit_string() {
        let (grid, config) = grid_and_config();
        let target = "034567891";
        let mut img = RgbImage::from_pixel(1000, 700, Rgb([255, 255, 255]));
        let columns = grid.columns();
        for (col, digit) in target.chars().enumerate() {
            let row = digit.to_digit(10).unwrap() as usize;
            draw_dark_square(&mut img, columns[col][row], 8);
        }
        assert_eq!(read_identifier(&img, &grid, &config), target);
    }

    #[test]
    fn test_out_of_bounds_rows_are_never_selected() {
        let (grid, config) = grid_and_config();
        // Image cropped so the bottom grid rows fall outside; an otherwise
        // blank page must still pick an in-bounds row for every column.
        let img = RgbImage::from_pixel(1000, 300, Rgb([255, 255, 255]));
        let digits = read_identifier(&img, &grid, &config);
        assert_eq!(digits.len(), ID_COLUMNS);
        let columns = grid.columns();
        for (col, c) in digits.chars().enumerate() {
            let row = c.to_digit(10).unwrap() as usize;
            assert!(row < ID_ROWS);
            assert!(columns[col][row].y - config.sample_radius < 300);
        }
    }

    #[test]
    fn test_annotation_leaves_source_untouched() {
        let (grid, config) = grid_and_config();
        let img = RgbImage::from_pixel(1000, 700, Rgb([255, 255, 255]));
        let annotated = annotate_identifier(&img, &grid, "000000000", &config);
        assert_eq!(annotated.dimensions(), img.dimensions());
        assert_eq!(img.get_pixel(500, 350), &Rgb([255, 255, 255]));
    }
}
