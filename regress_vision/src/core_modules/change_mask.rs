// THEORY (Change Mask Extractor):
// Turning two aligned grayscale screenshots into "where did it change" is split
// in two:
//
//   ChangeDetector  -> a gray difference image (+ a similarity score if the
//                      strategy produces one)
//   MaskCleanup     -> Otsu + close + dilate, identical for every detector
//
// `Strategy` is the closed set of detectors a caller may ask for by name.
// Whether a detector is compiled in is a capability checked at call time,
// so asking for `ssim` in a build without it is a configuration error rather
// than a silent downgrade.

use crate::config::MaskConfig;
use crate::core_modules::morphology::MaskCleanup;
use crate::core_modules::pixel::pixel::ensure_same_dimensions;
use crate::error::{Result, VisionError};
use image::{GrayImage, Luma};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
    #[default]
    AbsDiff,
    Ssim,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::AbsDiff => "absdiff",
            Strategy::Ssim => "ssim",
        }
    }

    /// The detector for this strategy, if this build has it.
    pub fn detector(&self, config: &MaskConfig, capabilities: &Capabilities) -> Result<Box<dyn ChangeDetector>> {
        capabilities.check(*self)?;
        match self {
            Strategy::AbsDiff => Ok(Box::new(AbsDiffDetector {
                blur_sigma: config.blur_sigma,
            })),
            #[cfg(feature = "ssim")]
            Strategy::Ssim => Ok(Box::new(SsimDetector)),
            #[cfg(not(feature = "ssim"))]
            Strategy::Ssim => Err(VisionError::Configuration(
                "structural similarity is not available in this build".into(),
            )),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = VisionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "absdiff" => Ok(Strategy::AbsDiff),
            "ssim" => Ok(Strategy::Ssim),
            other => Err(VisionError::Configuration(format!(
                "unknown comparison method '{other}', expected 'absdiff' or 'ssim'"
            ))),
        }
    }
}

impl Serialize for Strategy {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Strategy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Which optional detectors this build carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub ssim: bool,
}

impl Capabilities {
    pub fn detect() -> Self {
        Self {
            ssim: cfg!(feature = "ssim"),
        }
    }

    pub fn supports(&self, strategy: Strategy) -> bool {
        match strategy {
            Strategy::AbsDiff => true,
            Strategy::Ssim => self.ssim,
        }
    }

    pub fn check(&self, strategy: Strategy) -> Result<()> {
        if self.supports(strategy) {
            Ok(())
        } else {
            Err(VisionError::Configuration(format!(
                "comparison method '{strategy}' is not available in this build"
            )))
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::detect()
    }
}

/// A gray difference image; brighter means more different.
#[derive(Debug, Clone)]
pub struct Difference {
    pub diff: GrayImage,
    pub similarity: Option<f64>,
}

pub trait ChangeDetector {
    fn strategy(&self) -> Strategy;
    fn difference(&self, a: &GrayImage, b: &GrayImage) -> Result<Difference>;
}

pub struct AbsDiffDetector {
    pub blur_sigma: f32,
}

impl ChangeDetector for AbsDiffDetector {
    fn strategy(&self) -> Strategy {
        Strategy::AbsDiff
    }

    fn difference(&self, a: &GrayImage, b: &GrayImage) -> Result<Difference> {
        ensure_same_dimensions(a.dimensions(), b.dimensions())?;
        let a = imageproc::filter::gaussian_blur_f32(a, self.blur_sigma);
        let b = imageproc::filter::gaussian_blur_f32(b, self.blur_sigma);
        let diff = GrayImage::from_fn(a.width(), a.height(), |x, y| {
            Luma([a.get_pixel(x, y)[0].abs_diff(b.get_pixel(x, y)[0])])
        });
        Ok(Difference {
            diff,
            similarity: None,
        })
    }
}

#[cfg(feature = "ssim")]
pub struct SsimDetector;

#[cfg(feature = "ssim")]
impl ChangeDetector for SsimDetector {
    fn strategy(&self) -> Strategy {
        Strategy::Ssim
    }

    fn difference(&self, a: &GrayImage, b: &GrayImage) -> Result<Difference> {
        let map = crate::core_modules::ssim::structural_similarity(a, b)?;
        Ok(Difference {
            diff: crate::core_modules::ssim::dissimilarity_image(&map),
            similarity: Some(map.score),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChangeMask {
    pub diff: GrayImage,
    /// Exactly 0 or 255 per pixel.
    pub mask: GrayImage,
    pub similarity: Option<f64>,
    pub otsu_level: u8,
}

impl ChangeMask {
    pub fn changed_pixels(&self) -> u64 {
        self.mask.pixels().filter(|p| p[0] == 255).count() as u64
    }

    pub fn total_pixels(&self) -> u64 {
        self.mask.width() as u64 * self.mask.height() as u64
    }

    /// `100 * changed / total`, 0 for an empty image.
    pub fn changed_percent(&self) -> f64 {
        let total = self.total_pixels();
        if total == 0 {
            return 0.0;
        }
        100.0 * self.changed_pixels() as f64 / total as f64
    }
}

/// Difference, threshold and clean up two equally sized grayscale images.
pub fn extract_change_mask(
    a: &GrayImage,
    b: &GrayImage,
    strategy: Strategy,
    config: &MaskConfig,
    capabilities: &Capabilities,
) -> Result<ChangeMask> {
    let detector = strategy.detector(config, capabilities)?;
    let Difference { diff, similarity } = detector.difference(a, b)?;
    let (otsu_level, mask) = MaskCleanup::new(config).apply(&diff);
    debug!(strategy = %detector.strategy(), otsu_level, ?similarity, "change mask extracted");
    Ok(ChangeMask {
        diff,
        mask,
        similarity,
        otsu_level,
    })
}
