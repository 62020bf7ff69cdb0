pub mod image_helper {
    use crate::error::{Result, VisionError};
    use image::{ExtendedColorType, GrayImage, ImageEncoder, RgbImage};
    use std::io::BufWriter;
    use std::path::Path;

    /// Encodes a raw buffer as PNG at `path`.
    pub fn save(
        path: &Path,
        width: u32,
        height: u32,
        buffer: &[u8],
        color_type: ExtendedColorType,
    ) -> Result<()> {
        let persistence = |source: std::io::Error| VisionError::Persistence {
            path: path.to_path_buf(),
            source,
        };

        let output = std::fs::File::create(path).map_err(persistence)?;
        let encoder = image::codecs::png::PngEncoder::new(BufWriter::new(output));
        encoder
            .write_image(buffer, width, height, color_type)
            .map_err(|e| persistence(std::io::Error::other(e)))?;

        tracing::debug!(path = %path.display(), width, height, "artifact written");
        Ok(())
    }

    pub fn save_rgb(path: &Path, image: &RgbImage) -> Result<()> {
        save(path, image.width(), image.height(), image.as_raw(), ExtendedColorType::Rgb8)
    }

    pub fn save_gray(path: &Path, image: &GrayImage) -> Result<()> {
        save(path, image.width(), image.height(), image.as_raw(), ExtendedColorType::L8)
    }
}
