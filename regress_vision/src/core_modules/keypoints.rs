// THEORY:
// Alignment needs a few hundred points that can be found again in the other
// screenshot. UI captures are full of hard corners (button edges, glyph
// strokes, icon outlines), so a FAST segment test is a natural detector:
// a pixel is a corner when 9 contiguous pixels of the 16-pixel Bresenham
// circle around it are all brighter, or all darker, than the center by more
// than a threshold.
//
// Each surviving corner gets:
//   - a response (sum of how far the arc pixels clear the threshold), used
//     for 3x3 non-maximum suppression and for keeping only the strongest N;
//   - an orientation from the intensity centroid of a radius-15 disc;
//   - a 256-bit descriptor: 256 fixed point pairs inside the same disc,
//     rotated by the orientation, compared on a smoothed copy of the image.
//
// The pair pattern is generated from a constant seed, so detection is a pure
// function of the pixels.

use image::GrayImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DESCRIPTOR_BYTES: usize = 32;
pub type Descriptor = [u8; DESCRIPTOR_BYTES];

const PATTERN_SEED: u64 = 0x0b1e_c7ed;
const ARC_LENGTH: usize = 9;

/// Bresenham circle of radius 3, clockwise from twelve o'clock.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    pub x: f32,
    pub y: f32,
    /// Orientation in radians.
    pub angle: f32,
    pub response: f32,
}

/// Keypoints with their descriptors, index-aligned.
#[derive(Debug, Clone, Default)]
pub struct Features {
    pub keypoints: Vec<KeyPoint>,
    pub descriptors: Vec<Descriptor>,
}

impl Features {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct OrbParams {
    pub max_features: usize,
    pub fast_threshold: u8,
    pub patch_radius: i32,
    pub smoothing_sigma: f32,
}

impl Default for OrbParams {
    fn default() -> Self {
        Self {
            max_features: 5000,
            fast_threshold: 20,
            patch_radius: 15,
            smoothing_sigma: 2.0,
        }
    }
}

pub struct OrbDetector {
    params: OrbParams,
    pattern: Vec<[(i32, i32); 2]>,
}

impl OrbDetector {
    pub fn new(params: OrbParams) -> Self {
        let pattern = sampling_pattern(params.patch_radius);
        Self { params, pattern }
    }

    /// Detects up to `max_features` oriented corners and describes them.
    pub fn detect_and_compute(&self, gray: &GrayImage) -> Features {
        let keypoints = self.detect(gray);
        if keypoints.is_empty() {
            return Features::default();
        }

        let smoothed = imageproc::filter::gaussian_blur_f32(gray, self.params.smoothing_sigma);
        let descriptors = keypoints
            .iter()
            .map(|kp| self.describe(&smoothed, kp))
            .collect();

        Features {
            keypoints,
            descriptors,
        }
    }

    /// Oriented corners, strongest first.
    pub fn detect(&self, gray: &GrayImage) -> Vec<KeyPoint> {
        let (width, height) = (gray.width() as i32, gray.height() as i32);
        let border = self.params.patch_radius + 1;
        if width <= 2 * border || height <= 2 * border {
            return Vec::new();
        }

        let scores = self.segment_scores(gray, border);
        let w = width as usize;
        let mut keypoints = Vec::new();
        for y in border..height - border {
            for x in border..width - border {
                let idx = y as usize * w + x as usize;
                let score = scores[idx];
                if score > 0.0 && is_local_maximum(&scores, w, x as usize, y as usize) {
                    keypoints.push(KeyPoint {
                        x: x as f32,
                        y: y as f32,
                        angle: self.orientation(gray, x, y),
                        response: score,
                    });
                }
            }
        }

        keypoints.sort_by(|a, b| b.response.total_cmp(&a.response));
        keypoints.truncate(self.params.max_features);
        keypoints
    }

    fn segment_scores(&self, gray: &GrayImage, border: i32) -> Vec<f32> {
        let (width, height) = (gray.width() as i32, gray.height() as i32);
        let raw = gray.as_raw();
        let w = width as usize;
        let mut scores = vec![0.0f32; raw.len()];
        let t = self.params.fast_threshold as i32;

        for y in border..height - border {
            for x in border..width - border {
                let center = raw[y as usize * w + x as usize] as i32;
                let mut ring = [0i32; 16];
                for (slot, (dx, dy)) in ring.iter_mut().zip(CIRCLE) {
                    *slot = raw[(y + dy) as usize * w + (x + dx) as usize] as i32 - center;
                }

                // Any 9-arc covers at least two of the four compass points.
                let compass = [ring[0], ring[4], ring[8], ring[12]];
                let bright = compass.iter().filter(|&&d| d > t).count();
                let dark = compass.iter().filter(|&&d| d < -t).count();
                if bright < 2 && dark < 2 {
                    continue;
                }

                let is_bright = has_arc(&ring, |d| d > t);
                let is_dark = has_arc(&ring, |d| d < -t);
                if !is_bright && !is_dark {
                    continue;
                }

                let bright_score: i32 = ring.iter().filter(|&&d| d > t).map(|&d| d - t).sum();
                let dark_score: i32 = ring.iter().filter(|&&d| d < -t).map(|&d| -d - t).sum();
                scores[y as usize * w + x as usize] = bright_score.max(dark_score) as f32;
            }
        }
        scores
    }

    fn orientation(&self, gray: &GrayImage, cx: i32, cy: i32) -> f32 {
        let r = self.params.patch_radius;
        let mut m01 = 0.0f64;
        let mut m10 = 0.0f64;
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy > r * r {
                    continue;
                }
                let v = gray.get_pixel((cx + dx) as u32, (cy + dy) as u32)[0] as f64;
                m10 += dx as f64 * v;
                m01 += dy as f64 * v;
            }
        }
        m01.atan2(m10) as f32
    }

    fn describe(&self, smoothed: &GrayImage, kp: &KeyPoint) -> Descriptor {
        let (sin, cos) = kp.angle.sin_cos();
        let (cx, cy) = (kp.x as i32, kp.y as i32);
        let sample = |(px, py): (i32, i32)| -> u8 {
            let rx = (px as f32 * cos - py as f32 * sin).round() as i32;
            let ry = (px as f32 * sin + py as f32 * cos).round() as i32;
            smoothed.get_pixel((cx + rx) as u32, (cy + ry) as u32)[0]
        };

        let mut descriptor = [0u8; DESCRIPTOR_BYTES];
        for (bit, pair) in self.pattern.iter().enumerate() {
            if sample(pair[0]) < sample(pair[1]) {
                descriptor[bit / 8] |= 1 << (bit % 8);
            }
        }
        descriptor
    }
}

impl Default for OrbDetector {
    fn default() -> Self {
        Self::new(OrbParams::default())
    }
}

fn has_arc(ring: &[i32; 16], pred: impl Fn(i32) -> bool) -> bool {
    let mut run = 0;
    for i in 0..ring.len() + ARC_LENGTH - 1 {
        if pred(ring[i % ring.len()]) {
            run += 1;
            if run >= ARC_LENGTH {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// Ties go to the earlier pixel in raster order.
fn is_local_maximum(scores: &[f32], w: usize, x: usize, y: usize) -> bool {
    let idx = y * w + x;
    let score = scores[idx];
    for ny in y - 1..=y + 1 {
        for nx in x - 1..=x + 1 {
            let n = ny * w + nx;
            if n == idx {
                continue;
            }
            let other = scores[n];
            if (n < idx && other >= score) || (n > idx && other > score) {
                return false;
            }
        }
    }
    true
}

fn sampling_pattern(radius: i32) -> Vec<[(i32, i32); 2]> {
    let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
    let mut point = || loop {
        let p = (rng.gen_range(-radius..=radius), rng.gen_range(-radius..=radius));
        if p.0 * p.0 + p.1 * p.1 <= radius * radius {
            return p;
        }
    };
    (0..DESCRIPTOR_BYTES * 8)
        .map(|_| loop {
            let pair = [point(), point()];
            if pair[0] != pair[1] {
                break pair;
            }
        })
        .collect()
}
