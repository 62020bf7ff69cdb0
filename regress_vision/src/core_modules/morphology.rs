// THEORY:
// A raw difference image is noisy: anti-aliased text and compression artifacts
// light up isolated pixels, and a real change (a moved button) shows up as a
// ring of edges with a hollow middle. The shared cleanup turns that into solid
// blobs:
//
//   1. Otsu picks the gray level that best separates "background noise" from
//      "changed" in this particular diff's histogram.
//   2. Binarize: 255 strictly above the level, 0 otherwise.
//   3. Close (dilate then erode) fills hairline gaps inside a change.
//   4. One more dilation merges fragments that belong together.
//
// Every structuring element is the 5x5 square, i.e. an L-infinity ball of
// radius 2.

use crate::config::MaskConfig;
use imageproc::distance_transform::Norm;
use image::{GrayImage, Luma};

pub const KERNEL_RADIUS: u8 = 2;

/// Otsu's threshold: the level maximizing between-class variance.
/// Pixels strictly greater than the level are foreground.
pub fn otsu_level(image: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for p in image.pixels() {
        histogram[p[0] as usize] += 1;
    }

    let total = image.pixels().len() as f64;
    if total == 0.0 {
        return 0;
    }
    let weighted_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(level, &count)| level as f64 * count as f64)
        .sum();

    let mut best_level = 0u8;
    let mut best_variance = 0.0f64;
    let mut background_weight = 0.0f64;
    let mut background_sum = 0.0f64;

    for (level, &count) in histogram.iter().enumerate() {
        background_weight += count as f64;
        background_sum += level as f64 * count as f64;
        let foreground_weight = total - background_weight;
        if background_weight == 0.0 || foreground_weight == 0.0 {
            continue;
        }

        let background_mean = background_sum / background_weight;
        let foreground_mean = (weighted_total - background_sum) / foreground_weight;
        let spread = background_mean - foreground_mean;
        let variance = background_weight * foreground_weight * spread * spread;
        if variance > best_variance {
            best_variance = variance;
            best_level = level as u8;
        }
    }
    best_level
}

pub fn binarize(image: &GrayImage, level: u8) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y)[0] > level {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

pub fn dilate(mask: &GrayImage, iterations: u32) -> GrayImage {
    (0..iterations).fold(mask.clone(), |acc, _| {
        imageproc::morphology::dilate(&acc, Norm::LInf, KERNEL_RADIUS)
    })
}

pub fn erode(mask: &GrayImage, iterations: u32) -> GrayImage {
    (0..iterations).fold(mask.clone(), |acc, _| {
        imageproc::morphology::erode(&acc, Norm::LInf, KERNEL_RADIUS)
    })
}

/// Morphological closing applied `iterations` times, dilations first.
pub fn close(mask: &GrayImage, iterations: u32) -> GrayImage {
    erode(&dilate(mask, iterations), iterations)
}

/// Threshold plus morphology, shared by every change detector.
#[derive(Debug, Clone)]
pub struct MaskCleanup {
    pub close_iterations: u32,
    pub dilate_iterations: u32,
}

impl MaskCleanup {
    pub fn new(config: &MaskConfig) -> Self {
        Self {
            close_iterations: config.close_iterations,
            dilate_iterations: config.dilate_iterations,
        }
    }

    /// Returns the Otsu level and the cleaned 0/255 mask.
    pub fn apply(&self, diff: &GrayImage) -> (u8, GrayImage) {
        let level = otsu_level(diff);
        let mask = binarize(diff, level);
        let mask = close(&mask, self.close_iterations);
        let mask = dilate(&mask, self.dilate_iterations);
        tracing::debug!(otsu_level = level, "change mask cleaned");
        (level, mask)
    }
}

impl Default for MaskCleanup {
    fn default() -> Self {
        Self::new(&MaskConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_set(mask: &GrayImage) -> usize {
        mask.pixels().filter(|p| p[0] == 255).count()
    }

    #[test]
    fn otsu_splits_a_bimodal_histogram() {
        let image = GrayImage::from_fn(100, 10, |x, _| if x < 60 { Luma([30]) } else { Luma([200]) });
        let level = otsu_level(&image);
        assert!((30..200).contains(&level));
        assert_eq!(count_set(&binarize(&image, level)), 400);
    }

    #[test]
    fn otsu_on_constant_image_is_zero() {
        assert_eq!(otsu_level(&GrayImage::new(16, 16)), 0);
        assert_eq!(count_set(&binarize(&GrayImage::new(16, 16), 0)), 0);
    }

    #[test]
    fn binarize_is_strict() {
        let image = GrayImage::from_fn(3, 1, |x, _| Luma([99 + x as u8]));
        let mask = binarize(&image, 100);
        assert_eq!(mask.as_raw(), &vec![0, 0, 255]);
    }

    #[test]
    fn dilation_grows_by_the_kernel_radius() {
        let mut mask = GrayImage::new(21, 21);
        mask.put_pixel(10, 10, Luma([255]));
        assert_eq!(count_set(&dilate(&mask, 1)), 25);
        assert_eq!(count_set(&dilate(&mask, 2)), 81);
    }

    #[test]
    fn close_fills_a_hairline_gap() {
        let mut mask = GrayImage::new(40, 20);
        for y in 5..15 {
            for x in 5..35 {
                if x != 20 {
                    mask.put_pixel(x, y, Luma([255]));
                }
            }
        }
        let closed = close(&mask, 2);
        assert_eq!(closed.get_pixel(20, 10)[0], 255);
        assert_eq!(closed.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn cleanup_of_an_empty_diff_is_empty() {
        let (_, mask) = MaskCleanup::default().apply(&GrayImage::new(30, 30));
        assert_eq!(count_set(&mask), 0);
    }

    #[test]
    fn cleanup_output_is_strictly_binary() {
        let diff = GrayImage::from_fn(50, 50, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]));
        let (_, mask) = MaskCleanup::default().apply(&diff);
        assert!(mask.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }
}
