// THEORY:
// Structural similarity compares local luminance, contrast and structure
// instead of raw intensities, so a re-rendered but visually equivalent region
// scores near 1 while a moved or restyled element drops toward 0.
//
// For every pixel, with uniform 7x7 window means (mu), sample variances
// (sigma^2, scaled by N / (N - 1)) and covariance:
//
//         (2 mu_a mu_b + C1) (2 sigma_ab + C2)
//   S = -------------------------------------------
//       (mu_a^2 + mu_b^2 + C1) (sigma_a^2 + sigma_b^2 + C2)
//
// with C1 = (0.01 * 255)^2 and C2 = (0.03 * 255)^2. Borders are
// reflect-padded. The scalar score is the mean of S with a (window - 1) / 2
// border cropped away, because those values were computed from padding.
//
// Identical inputs give S == 1 exactly at every pixel: numerator and
// denominator are computed from bit-identical terms.

use crate::core_modules::pixel::pixel::ensure_same_dimensions;
use crate::error::Result;
use image::GrayImage;

pub const WINDOW: usize = 7;
const DATA_RANGE: f64 = 255.0;
const K1: f64 = 0.01;
const K2: f64 = 0.03;

/// The per-pixel SSIM map and its cropped mean.
#[derive(Debug, Clone)]
pub struct SsimMap {
    pub width: u32,
    pub height: u32,
    pub values: Vec<f64>,
    pub score: f64,
}

impl SsimMap {
    pub fn at(&self, x: u32, y: u32) -> f64 {
        self.values[y as usize * self.width as usize + x as usize]
    }
}

/// Window side actually used: 7, or the largest odd size that fits.
pub fn window_for(width: u32, height: u32) -> usize {
    let fit = width.min(height) as usize;
    if fit >= WINDOW {
        WINDOW
    } else if fit % 2 == 1 {
        fit
    } else {
        fit.saturating_sub(1).max(1)
    }
}

pub fn structural_similarity(a: &GrayImage, b: &GrayImage) -> Result<SsimMap> {
    ensure_same_dimensions(a.dimensions(), b.dimensions())?;
    let (width, height) = a.dimensions();
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return Ok(SsimMap {
            width,
            height,
            values: Vec::new(),
            score: 1.0,
        });
    }

    let win = window_for(width, height);
    let samples = (win * win) as f64;
    let cov_norm = if samples > 1.0 { samples / (samples - 1.0) } else { 1.0 };

    let xa: Vec<f64> = a.as_raw().iter().map(|&v| v as f64).collect();
    let xb: Vec<f64> = b.as_raw().iter().map(|&v| v as f64).collect();
    let product = |p: &[f64], q: &[f64]| -> Vec<f64> { p.iter().zip(q).map(|(x, y)| x * y).collect() };

    let ux = uniform_filter(&xa, w, h, win);
    let uy = uniform_filter(&xb, w, h, win);
    let uxx = uniform_filter(&product(&xa, &xa), w, h, win);
    let uyy = uniform_filter(&product(&xb, &xb), w, h, win);
    let uxy = uniform_filter(&product(&xa, &xb), w, h, win);

    let c1 = (K1 * DATA_RANGE).powi(2);
    let c2 = (K2 * DATA_RANGE).powi(2);

    let values: Vec<f64> = (0..w * h)
        .map(|i| {
            let vx = cov_norm * (uxx[i] - ux[i] * ux[i]);
            let vy = cov_norm * (uyy[i] - uy[i] * uy[i]);
            let vxy = cov_norm * (uxy[i] - ux[i] * uy[i]);

            let a1 = 2.0 * ux[i] * uy[i] + c1;
            let a2 = 2.0 * vxy + c2;
            let b1 = ux[i] * ux[i] + uy[i] * uy[i] + c1;
            let b2 = vx + vy + c2;
            (a1 * a2) / (b1 * b2)
        })
        .collect();

    let pad = (win - 1) / 2;
    let score = cropped_mean(&values, w, h, pad);
    tracing::debug!(window = win, score, "structural similarity computed");

    Ok(SsimMap {
        width,
        height,
        values,
        score,
    })
}

/// Dissimilarity as a byte image: `clamp((1 - s) * 255)`.
pub fn dissimilarity_image(map: &SsimMap) -> GrayImage {
    let raw = map
        .values
        .iter()
        .map(|s| ((1.0 - s) * 255.0).clamp(0.0, 255.0) as u8)
        .collect();
    GrayImage::from_raw(map.width, map.height, raw).unwrap_or_else(|| GrayImage::new(map.width, map.height))
}

fn cropped_mean(values: &[f64], w: usize, h: usize, pad: usize) -> f64 {
    if w > 2 * pad && h > 2 * pad {
        let mut sum = 0.0;
        for y in pad..h - pad {
            sum += values[y * w + pad..y * w + w - pad].iter().sum::<f64>();
        }
        sum / ((w - 2 * pad) * (h - 2 * pad)) as f64
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Half-sample symmetric reflection: `d c b a | a b c d | d c b a`.
fn reflect(i: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let m = i.rem_euclid(period);
    (if m >= n { period - 1 - m } else { m }) as usize
}

/// Separable box mean with reflected borders.
fn uniform_filter(data: &[f64], w: usize, h: usize, win: usize) -> Vec<f64> {
    let r = (win / 2) as isize;
    let norm = win as f64;

    let mut rows = vec![0.0; w * h];
    for y in 0..h {
        let row = &data[y * w..(y + 1) * w];
        for x in 0..w {
            let sum: f64 = (-r..=r).map(|d| row[reflect(x as isize + d, w)]).sum();
            rows[y * w + x] = sum / norm;
        }
    }

    let mut out = vec![0.0; w * h];
    for y in 0..h {
        for x in 0..w {
            let sum: f64 = (-r..=r).map(|d| rows[reflect(y as isize + d, h) * w + x]).sum();
            out[y * w + x] = sum / norm;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Luma;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noise(width: u32, height: u32, seed: u64) -> GrayImage {
        let mut rng = StdRng::seed_from_u64(seed);
        GrayImage::from_fn(width, height, |_, _| Luma([rng.r#gen()]))
    }

    /// SSIM of one window covering the whole image, computed directly.
    fn global_ssim(a: &GrayImage, b: &GrayImage) -> f64 {
        let xa: Vec<f64> = a.as_raw().iter().map(|&v| v as f64).collect();
        let xb: Vec<f64> = b.as_raw().iter().map(|&v| v as f64).collect();
        let n = xa.len() as f64;
        let ma = xa.iter().sum::<f64>() / n;
        let mb = xb.iter().sum::<f64>() / n;
        let va = xa.iter().map(|v| (v - ma).powi(2)).sum::<f64>() / (n - 1.0);
        let vb = xb.iter().map(|v| (v - mb).powi(2)).sum::<f64>() / (n - 1.0);
        let cov = xa.iter().zip(&xb).map(|(p, q)| (p - ma) * (q - mb)).sum::<f64>() / (n - 1.0);
        let c1 = (0.01f64 * 255.0).powi(2);
        let c2 = (0.03f64 * 255.0).powi(2);
        ((2.0 * ma * mb + c1) * (2.0 * cov + c2)) / ((ma * ma + mb * mb + c1) * (va + vb + c2))
    }

    #[test]
    fn identical_images_score_exactly_one() {
        let image = noise(40, 30, 1);
        let map = structural_similarity(&image, &image).expect("ssim");
        assert_eq!(map.score, 1.0);
        assert!(map.values.iter().all(|&s| s == 1.0));
        assert!(dissimilarity_image(&map).pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn single_window_matches_direct_formula() {
        let a = noise(7, 7, 2);
        let b = noise(7, 7, 3);
        let map = structural_similarity(&a, &b).expect("ssim");
        // Only the center survives the crop, and its window is the whole image.
        assert_relative_eq!(map.score, global_ssim(&a, &b), epsilon = 1e-9);
        assert_relative_eq!(map.at(3, 3), map.score, epsilon = 1e-12);
    }

    #[test]
    fn different_images_score_below_one() {
        let a = noise(32, 32, 4);
        let b = noise(32, 32, 5);
        let map = structural_similarity(&a, &b).expect("ssim");
        assert!(map.score < 0.5);
        assert!(map.score >= -1.0);
    }

    #[test]
    fn small_images_shrink_the_window() {
        assert_eq!(window_for(100, 80), 7);
        assert_eq!(window_for(5, 40), 5);
        assert_eq!(window_for(6, 40), 5);
        assert_eq!(window_for(1, 1), 1);

        let image = noise(4, 4, 6);
        let map = structural_similarity(&image, &image).expect("ssim");
        assert_eq!(map.score, 1.0);
    }

    #[test]
    fn reflect_mirrors_without_repeating_past_the_edge() {
        assert_eq!(reflect(-1, 5), 0);
        assert_eq!(reflect(-2, 5), 1);
        assert_eq!(reflect(5, 5), 4);
        assert_eq!(reflect(6, 5), 3);
        assert_eq!(reflect(2, 5), 2);
    }

    #[test]
    fn mismatched_sizes_are_rejected() {
        assert!(structural_similarity(&GrayImage::new(8, 8), &GrayImage::new(8, 9)).is_err());
    }
}
