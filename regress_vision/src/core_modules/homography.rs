// THEORY:
// Two screenshots of the same page differ by a scroll offset, a few pixels of
// viewport shift, sometimes a slight zoom. All of that is a planar projective
// map, a 3x3 homography H with `candidate ~ H * baseline`.
//
// Estimation has two layers:
//   1. The Direct Linear Transform solves for H from >= 4 correspondences.
//      Points are first Hartley-normalized (centroid at the origin, mean
//      distance sqrt(2)) so the linear system is well conditioned in pixel
//      units. The null vector comes from the smallest eigenvector of A^T A.
//   2. RANSAC repeatedly fits minimal 4-point models, keeps the one with the
//      most correspondences under the reprojection threshold, then refits on
//      every inlier. The sampler is seeded, so the same matches always give
//      the same model.
//
// "No homography" is an error value, never a panic. The aligner turns it into
// a resize fallback.

use nalgebra::{DMatrix, Matrix3, Vector3};
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;

pub type Point2 = [f64; 2];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HomographyError {
    #[error("too few points: need {needed}, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    #[error("numerical failure: {0}")]
    NumericalFailure(String),
    #[error("insufficient inliers: need {needed}, found {found}")]
    InsufficientInliers { needed: usize, found: usize },
}

/// Maps `(x, y)` through `h`. Points sent to infinity come back as NaN.
pub fn project(h: &Matrix3<f64>, x: f64, y: f64) -> Point2 {
    let p = h * Vector3::new(x, y, 1.0);
    if p[2].abs() < 1e-15 {
        return [f64::NAN, f64::NAN];
    }
    [p[0] / p[2], p[1] / p[2]]
}

pub fn reprojection_error(h: &Matrix3<f64>, src: &Point2, dst: &Point2) -> f64 {
    let p = project(h, src[0], src[1]);
    (p[0] - dst[0]).hypot(p[1] - dst[1])
}

/// True when every entry is finite and the matrix is safely invertible.
pub fn is_usable(h: &Matrix3<f64>) -> bool {
    h.iter().all(|v| v.is_finite()) && h.determinant().abs() > 1e-12
}

fn normalize_points(points: &[Point2]) -> (Matrix3<f64>, Vec<Point2>) {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = points.iter().map(|p| p[1]).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| (p[0] - cx).hypot(p[1] - cy))
        .sum::<f64>()
        / n;

    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    #[rustfmt::skip]
    let t = Matrix3::new(
        s, 0.0, -s * cx,
        0.0, s, -s * cy,
        0.0, 0.0, 1.0,
    );
    let normalized = points
        .iter()
        .map(|p| [s * (p[0] - cx), s * (p[1] - cy)])
        .collect();
    (t, normalized)
}

/// Least-squares homography with `dst ~ H * src` from >= 4 correspondences.
pub fn estimate_homography_dlt(
    src: &[Point2],
    dst: &[Point2],
) -> Result<Matrix3<f64>, HomographyError> {
    let n = src.len().min(dst.len());
    if n < 4 {
        return Err(HomographyError::TooFewPoints { needed: 4, got: n });
    }
    if src.len() != dst.len() {
        return Err(HomographyError::NumericalFailure(
            "source and destination sets differ in length".into(),
        ));
    }

    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (s, d)) in src_n.iter().zip(&dst_n).enumerate() {
        let (sx, sy) = (s[0], s[1]);
        let (dx, dy) = (d[0], d[1]);

        a[(2 * i, 3)] = -sx;
        a[(2 * i, 4)] = -sy;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = dy * sx;
        a[(2 * i, 7)] = dy * sy;
        a[(2 * i, 8)] = dy;

        a[(2 * i + 1, 0)] = sx;
        a[(2 * i + 1, 1)] = sy;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -dx * sx;
        a[(2 * i + 1, 7)] = -dx * sy;
        a[(2 * i + 1, 8)] = -dx;
    }

    let ata = a.transpose() * &a;
    let eig = nalgebra::SymmetricEigen::new(ata);
    let min_idx = (0..9)
        .min_by(|&i, &j| {
            eig.eigenvalues[i]
                .abs()
                .total_cmp(&eig.eigenvalues[j].abs())
        })
        .unwrap_or(0);
    let h_norm = Matrix3::from_fn(|r, c| eig.eigenvectors[(r * 3 + c, min_idx)]);

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| HomographyError::NumericalFailure("normalizer not invertible".into()))?;
    let h = t_dst_inv * h_norm * t_src;

    let scale = h[(2, 2)];
    if scale.abs() < 1e-15 {
        Ok(h)
    } else {
        Ok(h / scale)
    }
}

#[derive(Debug, Clone)]
pub struct RansacConfig {
    pub max_iters: usize,
    /// Reprojection error, in pixels, under which a correspondence is an inlier.
    pub inlier_threshold: f64,
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            inlier_threshold: 5.0,
            min_inliers: 4,
            seed: 0x5eed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RansacFit {
    pub h: Matrix3<f64>,
    pub inlier_mask: Vec<bool>,
    pub n_inliers: usize,
}

fn inliers_of(h: &Matrix3<f64>, src: &[Point2], dst: &[Point2], threshold: f64) -> Vec<bool> {
    src.iter()
        .zip(dst)
        .map(|(s, d)| reprojection_error(h, s, d) < threshold)
        .collect()
}

/// Outlier-robust homography with `dst ~ H * src`.
pub fn fit_homography_ransac(
    src: &[Point2],
    dst: &[Point2],
    config: &RansacConfig,
) -> Result<RansacFit, HomographyError> {
    let n = src.len().min(dst.len());
    if n < 4 {
        return Err(HomographyError::TooFewPoints { needed: 4, got: n });
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best_count = 0usize;
    let mut best_mask = vec![false; n];
    let mut best_h = Matrix3::identity();

    for _ in 0..config.max_iters {
        let sample = rand::seq::index::sample(&mut rng, n, 4);
        let s4: Vec<Point2> = sample.iter().map(|i| src[i]).collect();
        let d4: Vec<Point2> = sample.iter().map(|i| dst[i]).collect();

        let Ok(h) = estimate_homography_dlt(&s4, &d4) else {
            continue;
        };
        if !is_usable(&h) {
            continue;
        }

        let mask = inliers_of(&h, &src[..n], &dst[..n], config.inlier_threshold);
        let count = mask.iter().filter(|&&m| m).count();
        if count > best_count {
            best_count = count;
            best_mask = mask;
            best_h = h;

            if count * 10 > n * 9 {
                break;
            }
        }
    }

    if best_count < config.min_inliers.max(4) {
        return Err(HomographyError::InsufficientInliers {
            needed: config.min_inliers.max(4),
            found: best_count,
        });
    }

    let inlier_src: Vec<Point2> = (0..n).filter(|&i| best_mask[i]).map(|i| src[i]).collect();
    let inlier_dst: Vec<Point2> = (0..n).filter(|&i| best_mask[i]).map(|i| dst[i]).collect();
    let h = match estimate_homography_dlt(&inlier_src, &inlier_dst) {
        Ok(refit) if is_usable(&refit) => refit,
        _ => best_h,
    };

    let inlier_mask = inliers_of(&h, &src[..n], &dst[..n], config.inlier_threshold);
    let n_inliers = inlier_mask.iter().filter(|&&m| m).count();
    tracing::debug!(matches = n, inliers = n_inliers, "homography fitted");

    Ok(RansacFit {
        h,
        inlier_mask,
        n_inliers,
    })
}
