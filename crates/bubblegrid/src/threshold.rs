//! Global Otsu thresholding over 8-bit grayscale images.

use image::GrayImage;

/// Otsu's threshold: the level maximizing between-class variance of the
/// image histogram. Returns 0 for an empty image.
pub fn otsu_level(gray: &GrayImage) -> u8 {
    let mut histogram = [0u32; 256];
    for pixel in gray.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let total = gray.width() as u64 * gray.height() as u64;
    if total == 0 {
        return 0;
    }

    let weighted_sum: u64 = histogram
        .iter()
        .enumerate()
        .map(|(v, &count)| v as u64 * count as u64)
        .sum();

    let mut best_level = 0u8;
    let mut best_variance = 0.0f64;
    let mut background_count = 0u64;
    let mut background_sum = 0u64;

    for level in 0..256usize {
        background_count += histogram[level] as u64;
        if background_count == 0 {
            continue;
        }
        let foreground_count = total - background_count;
        if foreground_count == 0 {
            break;
        }
        background_sum += level as u64 * histogram[level] as u64;

        let mean_bg = background_sum as f64 / background_count as f64;
        let mean_fg = (weighted_sum - background_sum) as f64 / foreground_count as f64;
        let between = background_count as f64 * foreground_count as f64
            * (mean_bg - mean_fg)
            * (mean_bg - mean_fg);

        if between > best_variance {
            best_variance = between;
            best_level = level as u8;
        }
    }

    best_level
}

/// Binarize with inverted polarity: pixels at or below `level` (ink) become
/// 255, everything brighter becomes 0.
pub fn binarize_inverted(gray: &GrayImage, level: u8) -> GrayImage {
    let mut out = GrayImage::new(gray.width(), gray.height());
    for (src, dst) in gray.pixels().zip(out.pixels_mut()) {
        dst[0] = if src[0] <= level { 255 } else { 0 };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_otsu_separates_bimodal_histogram() {
        let mut img = GrayImage::new(20, 20);
        for (x, _, p) in img.enumerate_pixels_mut() {
            *p = Luma([if x < 10 { 30 } else { 220 }]);
        }
        let level = otsu_level(&img);
        assert!((30..220).contains(&level), "level was {}", level);
    }

    #[test]
    fn test_binarize_inverted_marks_ink_as_foreground() {
        let mut img = GrayImage::new(4, 1);
        img.put_pixel(0, 0, Luma([10]));
        img.put_pixel(1, 0, Luma([100]));
        img.put_pixel(2, 0, Luma([101]));
        img.put_pixel(3, 0, Luma([255]));
        let bin = binarize_inverted(&img, 100);
        let values: Vec<u8> = bin.pixels().map(|p| p[0]).collect();
        assert_eq!(values, vec![255, 255, 0, 0]);
    }

    #[test]
    fn test_empty_image() {
        let img = GrayImage::new(0, 0);
        assert_eq!(otsu_level(&img), 0);
    }
}
