// THEORY:
// Screenshot paths in test suites are written relative to "somewhere": the
// repository, the directory the runner was started from, a fixtures folder.
// `ImageLocator` turns one user-supplied path into an ordered list of
// candidate locations and opens the first one that decodes.
//
// Order: the path as given, the project root, the current working directory,
// then any configured search roots. Duplicates are tried once. When nothing
// works, the error lists every location so the failure is diagnosable from
// a CI log alone.

use crate::error::{Result, VisionError};
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The fixed project-relative root images and default artifacts hang off.
pub fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

#[derive(Debug, Clone)]
pub struct ImageLocator {
    project_root: PathBuf,
    search_roots: Vec<PathBuf>,
}

impl ImageLocator {
    pub fn new(search_roots: Vec<PathBuf>) -> Self {
        Self {
            project_root: project_root(),
            search_roots,
        }
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    /// Every location `path` may refer to, in lookup order, without repeats.
    pub fn candidates(&self, path: &str) -> Vec<PathBuf> {
        let given = PathBuf::from(path);
        let mut roots = vec![self.project_root.clone()];
        if let Ok(cwd) = std::env::current_dir() {
            roots.push(cwd);
        }
        roots.extend(self.search_roots.iter().cloned());

        let mut out = vec![given.clone()];
        for root in roots {
            let candidate = root.join(&given);
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        out
    }

    /// Opens the first candidate that exists and decodes, as 8-bit RGB.
    pub fn load(&self, path: &str) -> Result<RgbImage> {
        let candidates = self.candidates(path);
        for candidate in &candidates {
            if !candidate.is_file() {
                continue;
            }
            match image::open(candidate) {
                Ok(image) => {
                    debug!(path, resolved = %candidate.display(), "image loaded");
                    return Ok(image.to_rgb8());
                }
                Err(e) => debug!(resolved = %candidate.display(), error = %e, "image could not be decoded"),
            }
        }

        Err(VisionError::Resolution {
            path: path.to_string(),
            tried: candidates.iter().map(|c| display(c)).collect(),
            cwd: std::env::current_dir()
                .map(|d| display(&d))
                .unwrap_or_else(|_| "<unavailable>".into()),
        })
    }
}

impl Default for ImageLocator {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn candidates_start_with_the_given_path() {
        let locator = ImageLocator::new(vec![PathBuf::from("/fixtures")]).with_project_root("/project");
        let candidates = locator.candidates("shots/home.png");
        assert_eq!(candidates[0], PathBuf::from("shots/home.png"));
        assert_eq!(candidates[1], PathBuf::from("/project/shots/home.png"));
        assert_eq!(candidates.last(), Some(&PathBuf::from("/fixtures/shots/home.png")));
    }

    #[test]
    fn absolute_paths_are_tried_once() {
        let locator = ImageLocator::new(vec![PathBuf::from("/fixtures")]);
        let candidates = locator.candidates("/abs/shot.png");
        assert_eq!(candidates, vec![PathBuf::from("/abs/shot.png")]);
    }

    #[test]
    fn image_is_found_under_a_search_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        RgbImage::from_pixel(4, 3, Rgb([9, 8, 7]))
            .save(dir.path().join("found.png"))
            .expect("write");

        let locator = ImageLocator::new(vec![dir.path().to_path_buf()]);
        let image = locator.load("found.png").expect("load");
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(image.get_pixel(0, 0), &Rgb([9, 8, 7]));
    }

    #[test]
    fn missing_image_reports_every_location() {
        let locator = ImageLocator::new(vec![PathBuf::from("/nowhere/a"), PathBuf::from("/nowhere/b")]);
        match locator.load("definitely_missing_capture.png") {
            Err(VisionError::Resolution { path, tried, .. }) => {
                assert_eq!(path, "definitely_missing_capture.png");
                assert_eq!(tried.len(), locator.candidates("definitely_missing_capture.png").len());
                assert!(tried.iter().any(|t| t.starts_with("/nowhere/b")));
            }
            other => panic!("expected resolution error, got {other:?}"),
        }
    }

    #[test]
    fn undecodable_file_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("broken.png"), b"not a png").expect("write");
        let locator = ImageLocator::new(vec![dir.path().to_path_buf()]);
        assert!(matches!(
            locator.load("broken.png"),
            Err(VisionError::Resolution { .. })
        ));
    }
}
