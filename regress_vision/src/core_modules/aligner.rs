// THEORY (Geometric Aligner):
// The aligner tries to put the candidate screenshot into the baseline's pixel
// grid so that only real content changes survive differencing.
//
//   gray A, gray B -> oriented keypoints -> ratio-tested matches
//                  -> RANSAC homography (baseline -> candidate)
//                  -> bilinear warp of B onto A's grid
//
// Any stage may come up short: too few keypoints (blank or flat captures),
// too few unambiguous matches, or a degenerate model. None of these are
// errors. The aligner falls back to resizing B to A's dimensions and says so
// through `Alignment::aligned`. The caller always gets an image with the
// baseline's exact width and height.

use crate::config::AlignConfig;
use crate::core_modules::homography::{self, Point2};
use crate::core_modules::keypoints::OrbDetector;
use crate::core_modules::matcher;
use crate::core_modules::pixel::pixel::to_gray;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use nalgebra::Matrix3;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Alignment {
    pub image: RgbImage,
    /// True when a homography warp was applied, false for the resize fallback.
    pub aligned: bool,
    pub homography: Option<Matrix3<f64>>,
}

impl Alignment {
    fn fallback(baseline: &RgbImage, candidate: &RgbImage) -> Self {
        Self {
            image: resize_to(candidate, baseline.dimensions()),
            aligned: false,
            homography: None,
        }
    }
}

/// Registers `candidate` onto `baseline`. Never fails.
pub fn align(baseline: &RgbImage, candidate: &RgbImage, config: &AlignConfig) -> Alignment {
    match estimate(baseline, candidate, config) {
        Some(h) => {
            let image = warp_perspective(candidate, &h, baseline.dimensions());
            info!(method = "homography", "candidate aligned");
            Alignment {
                image,
                aligned: true,
                homography: Some(h),
            }
        }
        None => {
            info!(method = "resize", "alignment unavailable, falling back to resize");
            Alignment::fallback(baseline, candidate)
        }
    }
}

/// The baseline -> candidate homography, if one can be trusted.
pub fn estimate(baseline: &RgbImage, candidate: &RgbImage, config: &AlignConfig) -> Option<Matrix3<f64>> {
    let detector = OrbDetector::new(config.orb_params());
    let features_a = detector.detect_and_compute(&to_gray(baseline));
    let features_b = detector.detect_and_compute(&to_gray(candidate));
    debug!(
        baseline = features_a.len(),
        candidate = features_b.len(),
        "keypoints detected"
    );

    if features_a.len() < config.min_keypoints || features_b.len() < config.min_keypoints {
        debug!(min = config.min_keypoints, "too few keypoints");
        return None;
    }
    if features_a.descriptors.is_empty() || features_b.descriptors.is_empty() {
        debug!("empty descriptor set");
        return None;
    }

    let good = matcher::ratio_test_matches(&features_a.descriptors, &features_b.descriptors, config.ratio);
    debug!(good = good.len(), "ratio-tested matches");
    if good.len() < config.min_matches {
        debug!(min = config.min_matches, "too few good matches");
        return None;
    }

    let (src, dst): (Vec<Point2>, Vec<Point2>) = good
        .iter()
        .map(|m| {
            let a = features_a.keypoints[m.query_idx];
            let b = features_b.keypoints[m.train_idx];
            ([a.x as f64, a.y as f64], [b.x as f64, b.y as f64])
        })
        .unzip();

    match homography::fit_homography_ransac(&src, &dst, &config.ransac()) {
        Ok(fit) if homography::is_usable(&fit.h) => Some(fit.h),
        Ok(_) => {
            debug!("homography is singular or non-finite");
            None
        }
        Err(e) => {
            debug!(error = %e, "homography fit failed");
            None
        }
    }
}

/// Resamples `candidate` into a `width x height` grid. Pixel for pixel
/// identical when the sizes already match.
pub fn resize_to(candidate: &RgbImage, (width, height): (u32, u32)) -> RgbImage {
    if candidate.dimensions() == (width, height) {
        return candidate.clone();
    }
    imageops::resize(candidate, width, height, FilterType::Nearest)
}

/// For every output pixel `p`, samples `source` at `h * p` with bilinear
/// interpolation. Samples that land outside the source are black.
pub fn warp_perspective(source: &RgbImage, h: &Matrix3<f64>, (width, height): (u32, u32)) -> RgbImage {
    let (sw, sh) = (source.width() as f64, source.height() as f64);
    RgbImage::from_fn(width, height, |x, y| {
        let [sx, sy] = homography::project(h, x as f64, y as f64);
        if !(sx >= -0.5 && sy >= -0.5 && sx <= sw - 0.5 && sy <= sh - 0.5) {
            return Rgb([0, 0, 0]);
        }
        bilinear(source, sx.clamp(0.0, sw - 1.0), sy.clamp(0.0, sh - 1.0))
    })
}

fn bilinear(source: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let x1 = (x0 + 1).min(source.width() - 1);
    let y1 = (y0 + 1).min(source.height() - 1);
    let (fx, fy) = (x - x0 as f64, y - y0 as f64);

    let p00 = source.get_pixel(x0, y0);
    let p10 = source.get_pixel(x1, y0);
    let p01 = source.get_pixel(x0, y1);
    let p11 = source.get_pixel(x1, y1);

    let mut out = [0u8; 3];
    for (c, slot) in out.iter_mut().enumerate() {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        *slot = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}
