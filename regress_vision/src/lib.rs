// THEORY:
// This file is the main entry point for the `regress_vision` library crate.
// The public surface is deliberately small: `compare` (or a configured
// `ComparisonPipeline`) takes two screenshot paths and returns a
// `ComparisonResult` after writing the review artifacts, and `BatchRunner`
// runs many such comparisons on a worker pool.
//
// Everything that does actual vision work (features, matching, homography,
// masks, regions, rendering) lives in `core_modules` and knows nothing about
// files or paths. Loading and writing happen only in `loader`, `report` and
// the orchestrating `pipeline`.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod loader;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod report;

pub use config::{AlignConfig, CompareConfig, MaskConfig, RenderConfig};
pub use core_modules::change_mask::{Capabilities, Strategy};
pub use error::{Result, VisionError};
pub use parallel_pipeline::BatchRunner;
pub use pipeline::{CompareRequest, ComparisonPipeline, compare};
pub use report::{AlignmentMethod, ArtifactName, ComparisonResult};
