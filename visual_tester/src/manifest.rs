// THEORY:
// A batch manifest is a TOML file with one `[[job]]` table per comparison.
// Per-job fields left out inherit the pipeline's configuration, so a manifest
// for a whole screenshot suite is usually just pairs of paths and a place to
// put the artifacts.

use anyhow::{Context, Result};
use regress_vision::{CompareRequest, ComparisonPipeline, Strategy};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default, rename = "job")]
    pub jobs: Vec<JobSpec>,
}

#[derive(Debug, Deserialize)]
pub struct JobSpec {
    pub baseline: String,
    pub candidate: String,
    pub output_dir: PathBuf,
    pub strategy: Option<Strategy>,
    pub align: Option<bool>,
    pub min_area: Option<f64>,
}

impl Manifest {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid manifest {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn requests(&self, pipeline: &ComparisonPipeline) -> Vec<CompareRequest> {
        self.jobs
            .iter()
            .map(|job| {
                let defaults = pipeline.request(job.baseline.clone(), job.candidate.clone());
                CompareRequest {
                    output_dir: Some(job.output_dir.clone()),
                    strategy: job.strategy.unwrap_or(defaults.strategy),
                    align: job.align.unwrap_or(defaults.align),
                    min_area: job.min_area.unwrap_or(defaults.min_area),
                    ..defaults
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regress_vision::CompareConfig;

    #[test]
    fn jobs_inherit_pipeline_defaults() {
        let manifest = Manifest::parse(
            r#"
            [[job]]
            baseline = "shots/home_a.png"
            candidate = "shots/home_b.png"
            output_dir = "out/home"

            [[job]]
            baseline = "shots/cart_a.png"
            candidate = "shots/cart_b.png"
            output_dir = "out/cart"
            strategy = "SSIM"
            align = false
            min_area = 400.0
            "#,
        )
        .expect("parse");

        let pipeline = ComparisonPipeline::new(CompareConfig::default()).expect("pipeline");
        let requests = manifest.requests(&pipeline);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].strategy, Strategy::AbsDiff);
        assert!(requests[0].align);
        assert_eq!(requests[0].min_area, 100.0);
        assert_eq!(requests[0].output_dir, Some(PathBuf::from("out/home")));
        assert_eq!(requests[1].strategy, Strategy::Ssim);
        assert!(!requests[1].align);
        assert_eq!(requests[1].min_area, 400.0);
    }

    #[test]
    fn job_without_output_dir_is_rejected() {
        let err = Manifest::parse("[[job]]\nbaseline = \"a.png\"\ncandidate = \"b.png\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn empty_manifest_has_no_jobs() {
        assert!(Manifest::parse("").expect("parse").jobs.is_empty());
    }
}
