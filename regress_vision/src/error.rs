// THEORY:
// Every fatal condition of a comparison run is one variant of `VisionError`.
// The orchestrator aborts on the first one and hands it to the caller intact,
// so each variant carries the context a reviewer needs without the source:
// the locations that were tried, the artifact path that failed to write, the
// strategy that is not compiled in.
//
// A degraded alignment is deliberately absent here. It is a status, reported
// through `AlignmentMethod::Resize`, never an error.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    /// The image could not be found or decoded at any candidate location.
    #[error(
        "image not found or could not be opened: {path}\ntried the following locations:\n{}\ncurrent working dir: {cwd}",
        format_tried(.tried)
    )]
    Resolution {
        path: String,
        tried: Vec<String>,
        cwd: String,
    },

    /// A requested capability or setting is unavailable or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An artifact could not be written.
    #[error("failed to save artifact to {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Two images handed to a pairwise operation differ in size.
    #[error("dimension mismatch: {left_width}x{left_height} vs {right_width}x{right_height}")]
    DimensionMismatch {
        left_width: u32,
        left_height: u32,
        right_width: u32,
        right_height: u32,
    },

    /// Two batch jobs target the same output directory.
    #[error("output directory {} is used by more than one job", .path.display())]
    OutputConflict { path: PathBuf },

    /// A batch worker died before answering.
    #[error("comparison worker failed: {0}")]
    Worker(String),

    /// A configuration or manifest file could not be read or parsed.
    #[error("failed to load {}: {message}", .path.display())]
    ConfigFile { path: PathBuf, message: String },
}

fn format_tried(tried: &[String]) -> String {
    tried
        .iter()
        .map(|t| format!(" - {t}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl VisionError {
    pub(crate) fn dimension_mismatch(left: (u32, u32), right: (u32, u32)) -> Self {
        Self::DimensionMismatch {
            left_width: left.0,
            left_height: left.1,
            right_width: right.0,
            right_height: right.1,
        }
    }
}

pub type Result<T> = std::result::Result<T, VisionError>;
