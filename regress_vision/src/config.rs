// THEORY:
// Every tunable of a comparison lives in one owned value, `CompareConfig`,
// which is handed down the pipeline by reference. There are no process-wide
// settings: two pipelines with different configs can run side by side.
//
// Defaults reproduce the stock behavior (5000 features, ratio 0.75, 5 px RANSAC
// threshold, Otsu + close x2 + dilate x1, red overlay at 0.4, green boxes of
// thickness 2, heatmap at 0.6). A TOML file may override any subset; missing
// keys fall back to the defaults through `#[serde(default)]`.

use crate::core_modules::change_mask::Strategy;
use crate::core_modules::homography::RansacConfig;
use crate::core_modules::keypoints::OrbParams;
use crate::error::{Result, VisionError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    /// Where artifacts go when a request names no directory.
    pub output_dir: PathBuf,
    pub strategy: Strategy,
    pub align: bool,
    pub min_area: f64,
    /// Extra roots the image locator searches after the built-in ones.
    pub search_roots: Vec<PathBuf>,
    pub alignment: AlignConfig,
    pub mask: MaskConfig,
    pub render: RenderConfig,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            output_dir: crate::loader::project_root().join("output"),
            strategy: Strategy::AbsDiff,
            align: true,
            min_area: 100.0,
            search_roots: Vec::new(),
            alignment: AlignConfig::default(),
            mask: MaskConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    pub max_features: usize,
    pub fast_threshold: u8,
    pub ratio: f32,
    pub min_keypoints: usize,
    pub min_matches: usize,
    pub ransac_threshold: f64,
    pub ransac_max_iters: usize,
    pub ransac_seed: u64,
}

impl Default for AlignConfig {
    fn default() -> Self {
        let ransac = RansacConfig::default();
        Self {
            max_features: 5000,
            fast_threshold: 20,
            ratio: 0.75,
            min_keypoints: 10,
            min_matches: 10,
            ransac_threshold: ransac.inlier_threshold,
            ransac_max_iters: ransac.max_iters,
            ransac_seed: ransac.seed,
        }
    }
}

impl AlignConfig {
    pub fn orb_params(&self) -> OrbParams {
        OrbParams {
            max_features: self.max_features,
            fast_threshold: self.fast_threshold,
            ..OrbParams::default()
        }
    }

    pub fn ransac(&self) -> RansacConfig {
        RansacConfig {
            max_iters: self.ransac_max_iters,
            inlier_threshold: self.ransac_threshold,
            min_inliers: 4,
            seed: self.ransac_seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Gaussian sigma applied before absolute differencing.
    pub blur_sigma: f32,
    pub close_iterations: u32,
    pub dilate_iterations: u32,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.1,
            close_iterations: 2,
            dilate_iterations: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub overlay_color: [u8; 3],
    pub overlay_alpha: f32,
    pub box_color: [u8; 3],
    pub box_thickness: u32,
    pub heatmap_alpha: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            overlay_color: [255, 0, 0],
            overlay_alpha: 0.4,
            box_color: [0, 255, 0],
            box_thickness: 2,
            heatmap_alpha: 0.6,
        }
    }
}

impl CompareConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| VisionError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| VisionError::ConfigFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config: Self = toml::from_str(&text).map_err(|e| VisionError::ConfigFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(VisionError::Configuration(msg));

        if !(self.min_area.is_finite() && self.min_area >= 0.0) {
            return invalid(format!("min_area must be a non-negative number, got {}", self.min_area));
        }
        if self.alignment.max_features == 0 {
            return invalid("alignment.max_features must be positive".into());
        }
        if !(self.alignment.ratio > 0.0 && self.alignment.ratio <= 1.0) {
            return invalid(format!("alignment.ratio must be in (0, 1], got {}", self.alignment.ratio));
        }
        if !(self.alignment.ransac_threshold.is_finite() && self.alignment.ransac_threshold > 0.0) {
            return invalid("alignment.ransac_threshold must be positive".into());
        }
        if !(self.mask.blur_sigma.is_finite() && self.mask.blur_sigma > 0.0) {
            return invalid("mask.blur_sigma must be positive".into());
        }
        for (name, alpha) in [
            ("render.overlay_alpha", self.render.overlay_alpha),
            ("render.heatmap_alpha", self.render.heatmap_alpha),
        ] {
            if !(0.0..=1.0).contains(&alpha) {
                return invalid(format!("{name} must be in [0, 1], got {alpha}"));
            }
        }
        Ok(())
    }
}
