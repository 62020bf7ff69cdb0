// THEORY:
// The outcome of one comparison in two forms: a typed `ComparisonResult` for
// programs (and JSON via serde), and a short `report.txt` for people reading
// a CI artifact.
//
// Every artifact has a fixed file name inside the output directory, keyed by
// `ArtifactName`, so the result can say exactly what was written where.

use crate::core_modules::change_mask::Strategy;
use crate::error::{Result, VisionError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactName {
    AlignedCandidate,
    DiffMask,
    Overlay,
    BoundingBoxes,
    Heatmap,
    Report,
}

impl ArtifactName {
    pub const ALL: [ArtifactName; 6] = [
        ArtifactName::AlignedCandidate,
        ArtifactName::DiffMask,
        ArtifactName::Overlay,
        ArtifactName::BoundingBoxes,
        ArtifactName::Heatmap,
        ArtifactName::Report,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactName::AlignedCandidate => "aligned_B.png",
            ArtifactName::DiffMask => "diff_mask.png",
            ArtifactName::Overlay => "overlay.png",
            ArtifactName::BoundingBoxes => "bboxes.png",
            ArtifactName::Heatmap => "heatmap.png",
            ArtifactName::Report => "report.txt",
        }
    }

    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentMethod {
    Homography,
    Resize,
    Disabled,
}

impl fmt::Display for AlignmentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlignmentMethod::Homography => "homography",
            AlignmentMethod::Resize => "resize",
            AlignmentMethod::Disabled => "disabled",
        })
    }
}

/// The outcome of one comparison. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    changed_percent: f64,
    changed_pixels: u64,
    total_pixels: u64,
    regions_count: usize,
    similarity_score: Option<f64>,
    alignment: AlignmentMethod,
    strategy: Strategy,
    output_paths: BTreeMap<ArtifactName, PathBuf>,
}

impl ComparisonResult {
    pub(crate) fn new(
        changed_pixels: u64,
        total_pixels: u64,
        regions_count: usize,
        similarity_score: Option<f64>,
        alignment: AlignmentMethod,
        strategy: Strategy,
        output_paths: BTreeMap<ArtifactName, PathBuf>,
    ) -> Self {
        let changed_percent = if total_pixels == 0 {
            0.0
        } else {
            100.0 * changed_pixels as f64 / total_pixels as f64
        };
        Self {
            changed_percent,
            changed_pixels,
            total_pixels,
            regions_count,
            similarity_score,
            alignment,
            strategy,
            output_paths,
        }
    }

    /// Share of changed pixels, 0..=100.
    pub fn changed_percent(&self) -> f64 {
        self.changed_percent
    }

    pub fn changed_pixels(&self) -> u64 {
        self.changed_pixels
    }

    pub fn total_pixels(&self) -> u64 {
        self.total_pixels
    }

    pub fn regions_count(&self) -> usize {
        self.regions_count
    }

    /// Present only for the `ssim` strategy.
    pub fn similarity_score(&self) -> Option<f64> {
        self.similarity_score
    }

    pub fn alignment(&self) -> AlignmentMethod {
        self.alignment
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn output_paths(&self) -> &BTreeMap<ArtifactName, PathBuf> {
        &self.output_paths
    }

    pub fn output_path(&self, name: ArtifactName) -> Option<&Path> {
        self.output_paths.get(&name).map(PathBuf::as_path)
    }
}

/// The human-readable `report.txt` body.
pub fn render_report(baseline: &str, candidate: &str, result: &ComparisonResult) -> String {
    let mut lines = vec![
        "Image Comparison Report".to_string(),
        "=======================".to_string(),
        String::new(),
        format!("Image A: {baseline}"),
        format!("Image B: {candidate}"),
        format!("Alignment method: {}", result.alignment()),
        format!("Comparison method: {}", result.strategy()),
        format!(
            "Changed pixels: {} / {} ({:.4}%)",
            result.changed_pixels(),
            result.total_pixels(),
            result.changed_percent()
        ),
        format!("Regions detected: {}", result.regions_count()),
    ];
    if let Some(score) = result.similarity_score() {
        lines.push(format!("SSIM score: {score:.4} (1.0 = identical)"));
    }
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

pub fn write_report(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).map_err(|source| VisionError::Persistence {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "report written");
    Ok(())
}
