// THEORY:
// The `pipeline` module is the top-level API of the comparison engine. One
// call runs the whole chain, strictly forward:
//
//   load A, B -> align B onto A -> grayscale -> change mask -> regions
//             -> overlay / bboxes / heatmap -> artifacts + report
//
// Each call owns every intermediate it creates. A `ComparisonPipeline` holds
// only immutable configuration, so one instance may be shared across threads
// and called concurrently as long as the calls write to different
// directories.
//
// Anything fatal (unavailable strategy, unresolvable image, failed write)
// aborts the call with a `VisionError`; there are no partial results. A
// failed alignment is not fatal: it is reported as `AlignmentMethod::Resize`.

use crate::config::CompareConfig;
use crate::core_modules::aligner;
use crate::core_modules::change_mask::{Capabilities, Strategy, extract_change_mask};
use crate::core_modules::pixel::pixel::to_gray;
use crate::core_modules::region::BoxStyle;
use crate::core_modules::renderer;
use crate::core_modules::utils::image_helper::image_helper;
use crate::error::{Result, VisionError};
use crate::loader::ImageLocator;
use crate::report::{self, AlignmentMethod, ArtifactName, ComparisonResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// One comparison: which images, where to write, and how to compare.
#[derive(Debug, Clone, PartialEq)]
pub struct CompareRequest {
    pub baseline: String,
    pub candidate: String,
    /// Falls back to the pipeline's configured directory when `None`.
    pub output_dir: Option<PathBuf>,
    pub strategy: Strategy,
    pub align: bool,
    pub min_area: f64,
}

pub struct ComparisonPipeline {
    config: CompareConfig,
    locator: ImageLocator,
    capabilities: Capabilities,
}

impl ComparisonPipeline {
    pub fn new(config: CompareConfig) -> Result<Self> {
        config.validate()?;
        let locator = ImageLocator::new(config.search_roots.clone());
        Ok(Self {
            config,
            locator,
            capabilities: Capabilities::detect(),
        })
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_locator(mut self, locator: ImageLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn config(&self) -> &CompareConfig {
        &self.config
    }

    /// A request carrying this pipeline's configured defaults.
    pub fn request(&self, baseline: impl Into<String>, candidate: impl Into<String>) -> CompareRequest {
        CompareRequest {
            baseline: baseline.into(),
            candidate: candidate.into(),
            output_dir: None,
            strategy: self.config.strategy,
            align: self.config.align,
            min_area: self.config.min_area,
        }
    }

    /// The directory a request will write into.
    pub fn output_dir_for(&self, request: &CompareRequest) -> PathBuf {
        request
            .output_dir
            .clone()
            .unwrap_or_else(|| self.config.output_dir.clone())
    }

    pub fn compare(&self, request: &CompareRequest) -> Result<ComparisonResult> {
        self.capabilities.check(request.strategy)?;
        if !(request.min_area.is_finite() && request.min_area >= 0.0) {
            return Err(VisionError::Configuration(format!(
                "min_area must be a non-negative number, got {}",
                request.min_area
            )));
        }

        let out_dir = self.output_dir_for(request);
        std::fs::create_dir_all(&out_dir).map_err(|source| VisionError::Persistence {
            path: out_dir.clone(),
            source,
        })?;

        let baseline = self.locator.load(&request.baseline)?;
        let candidate = self.locator.load(&request.candidate)?;

        let (aligned, alignment) = if request.align {
            let result = aligner::align(&baseline, &candidate, &self.config.alignment);
            let method = if result.aligned {
                AlignmentMethod::Homography
            } else {
                AlignmentMethod::Resize
            };
            (result.image, method)
        } else {
            (aligner::resize_to(&candidate, baseline.dimensions()), AlignmentMethod::Disabled)
        };

        let mut paths = BTreeMap::new();
        let mut artifact = |name: ArtifactName| -> PathBuf {
            let path = name.path_in(&out_dir);
            paths.insert(name, path.clone());
            path
        };

        image_helper::save_rgb(&artifact(ArtifactName::AlignedCandidate), &aligned)?;

        let change = extract_change_mask(
            &to_gray(&baseline),
            &to_gray(&aligned),
            request.strategy,
            &self.config.mask,
            &self.capabilities,
        )?;

        let render = &self.config.render;
        let style = BoxStyle {
            color: render.box_color,
            thickness: render.box_thickness,
        };
        let overlay = renderer::overlay(&baseline, &change.mask, render.overlay_color, render.overlay_alpha)?;
        let (boxed, regions) = renderer::bounding_box_overlay(&overlay, &change.mask, request.min_area, &style)?;
        let heatmap = renderer::heatmap(&change.diff, &baseline, render.heatmap_alpha)?;

        image_helper::save_gray(&artifact(ArtifactName::DiffMask), &change.mask)?;
        image_helper::save_rgb(&artifact(ArtifactName::Overlay), &overlay)?;
        image_helper::save_rgb(&artifact(ArtifactName::BoundingBoxes), &boxed)?;
        image_helper::save_rgb(&artifact(ArtifactName::Heatmap), &heatmap)?;
        let report_path = artifact(ArtifactName::Report);

        let result = ComparisonResult::new(
            change.changed_pixels(),
            change.total_pixels(),
            regions.len(),
            change.similarity,
            alignment,
            request.strategy,
            paths,
        );
        report::write_report(
            &report_path,
            &report::render_report(&request.baseline, &request.candidate, &result),
        )?;

        info!(
            baseline = %request.baseline,
            candidate = %request.candidate,
            alignment = %result.alignment(),
            strategy = %result.strategy(),
            changed_percent = result.changed_percent(),
            regions = result.regions_count(),
            "comparison finished"
        );
        Ok(result)
    }
}

/// Compares two screenshots with the default configuration.
///
/// `output_dir` defaults to `output` under the project root.
pub fn compare(
    baseline: &str,
    candidate: &str,
    output_dir: Option<&Path>,
    strategy: Strategy,
    align: bool,
    min_area: f64,
) -> Result<ComparisonResult> {
    let pipeline = ComparisonPipeline::new(CompareConfig::default())?;
    let request = CompareRequest {
        baseline: baseline.to_string(),
        candidate: candidate.to_string(),
        output_dir: output_dir.map(Path::to_path_buf),
        strategy,
        align,
        min_area,
    };
    pipeline.compare(&request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_pair(dir: &Path) -> (String, String) {
        let a = dir.join("a.png");
        let b = dir.join("b.png");
        RgbImage::from_pixel(60, 40, Rgb([240, 240, 240])).save(&a).expect("write a");
        let mut changed = RgbImage::from_pixel(60, 40, Rgb([240, 240, 240]));
        for y in 10..30 {
            for x in 20..40 {
                changed.put_pixel(x, y, Rgb([10, 10, 10]));
            }
        }
        changed.save(&b).expect("write b");
        (a.display().to_string(), b.display().to_string())
    }

    #[test]
    fn request_carries_configured_defaults() {
        let config = CompareConfig {
            min_area: 42.0,
            align: false,
            ..CompareConfig::default()
        };
        let pipeline = ComparisonPipeline::new(config).expect("pipeline");
        let request = pipeline.request("a.png", "b.png");
        assert_eq!(request.min_area, 42.0);
        assert!(!request.align);
        assert_eq!(
            pipeline.output_dir_for(&request),
            crate::loader::project_root().join("output")
        );
    }

    #[test]
    fn every_artifact_is_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (a, b) = write_pair(dir.path());
        let out = dir.path().join("nested").join("out");

        let result = compare(&a, &b, Some(&out), Strategy::AbsDiff, false, 100.0).expect("compare");

        assert_eq!(result.alignment(), AlignmentMethod::Disabled);
        assert_eq!(result.output_paths().len(), 6);
        for name in ArtifactName::ALL {
            let path = result.output_path(name).expect("path");
            assert!(path.is_file(), "{} missing", path.display());
        }
        assert_eq!(result.regions_count(), 1);
        assert!(result.changed_percent() > 0.0);
    }

    #[test]
    fn missing_capability_fails_before_touching_the_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("never");
        let pipeline = ComparisonPipeline::new(CompareConfig::default())
            .expect("pipeline")
            .with_capabilities(Capabilities { ssim: false });
        let request = CompareRequest {
            output_dir: Some(out.clone()),
            strategy: Strategy::Ssim,
            ..pipeline.request("a.png", "b.png")
        };
        assert!(matches!(pipeline.compare(&request), Err(VisionError::Configuration(_))));
        assert!(!out.exists());
    }

    #[test]
    fn unresolvable_candidate_aborts_the_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (a, _) = write_pair(dir.path());
        let out = dir.path().join("out");
        let err = compare(&a, "no_such_candidate.png", Some(&out), Strategy::AbsDiff, true, 100.0).unwrap_err();
        assert!(matches!(err, VisionError::Resolution { .. }));
        assert!(!out.join("report.txt").exists());
    }
}
