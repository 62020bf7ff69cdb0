pub mod aligner;
pub mod change_mask;
pub mod homography;
pub mod keypoints;
pub mod matcher;
pub mod morphology;
pub mod pixel;
pub mod region;
pub mod renderer;
#[cfg(feature = "ssim")]
pub mod ssim;
pub mod utils;
