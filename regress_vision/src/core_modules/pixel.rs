// THEORY (Pixel Heuristics):
// The `Pixel` module is the smallest unit of the comparison engine: a "dumb" RGB
// container plus the handful of single-pixel formulas every other layer leans on.
//
// The one that matters most is luminance. All grayscale-only operations (feature
// detection, differencing, structural similarity) run on images produced by
// `to_gray`, and `to_gray` uses exactly one formula, Rec. 601 luma, rounded to
// the nearest byte. Baseline and candidate therefore always collapse to gray
// the same way, which keeps "identical color input => identical gray input".
//
// Blending lives here too, because the artifact renderer composes overlays one
// pixel at a time and wants the same rounding everywhere.

pub mod pixel {
    use crate::error::{Result, VisionError};
    use image::{GrayImage, Luma, Rgb, RgbImage};

    pub type Channel = u8;
    pub type Luminance = f64;

    /// A "dumb" data container representing a single RGB pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        pub red: Channel,
        pub green: Channel,
        pub blue: Channel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Self { red, green, blue }
        }

        /// Luminance estimate (Rec. 601 luma) on the 0..255 scale.
        pub fn luminance(&self) -> Luminance {
            0.299_f64 * self.red as f64 + 0.587_f64 * self.green as f64 + 0.114_f64 * self.blue as f64
        }

        /// The grayscale byte this pixel collapses to.
        pub fn gray(&self) -> Channel {
            self.luminance().round().clamp(0.0, 255.0) as Channel
        }

        /// `alpha * layer + (1 - alpha) * self`, rounded and saturated per channel.
        pub fn blend(&self, layer: Pixel, alpha: f32) -> Pixel {
            let mix = |base: Channel, top: Channel| -> Channel {
                let v = alpha * top as f32 + (1.0 - alpha) * base as f32;
                v.round().clamp(0.0, 255.0) as Channel
            };
            Pixel {
                red: mix(self.red, layer.red),
                green: mix(self.green, layer.green),
                blue: mix(self.blue, layer.blue),
            }
        }
    }

    impl From<&Rgb<u8>> for Pixel {
        fn from(rgb: &Rgb<u8>) -> Self {
            Pixel::new(rgb[0], rgb[1], rgb[2])
        }
    }

    impl From<[u8; 3]> for Pixel {
        fn from(rgb: [u8; 3]) -> Self {
            Pixel::new(rgb[0], rgb[1], rgb[2])
        }
    }

    impl From<Pixel> for Rgb<u8> {
        fn from(pixel: Pixel) -> Self {
            Rgb([pixel.red, pixel.green, pixel.blue])
        }
    }

    /// Collapses a color image to grayscale with the Rec. 601 formula.
    pub fn to_gray(image: &RgbImage) -> GrayImage {
        GrayImage::from_fn(image.width(), image.height(), |x, y| {
            Luma([Pixel::from(image.get_pixel(x, y)).gray()])
        })
    }

    /// Fails unless both dimension pairs are equal.
    pub fn ensure_same_dimensions(left: (u32, u32), right: (u32, u32)) -> Result<()> {
        if left != right {
            return Err(VisionError::dimension_mismatch(left, right));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::pixel::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn luminance_weights_sum_to_white() {
        assert_eq!(Pixel::new(255, 255, 255).gray(), 255);
        assert_eq!(Pixel::new(0, 0, 0).gray(), 0);
        assert_eq!(Pixel::new(128, 128, 128).gray(), 128);
    }

    #[test]
    fn green_dominates_luminance() {
        let green = Pixel::new(0, 255, 0).luminance();
        let red = Pixel::new(255, 0, 0).luminance();
        let blue = Pixel::new(0, 0, 255).luminance();
        assert!(green > red && red > blue);
    }

    #[test]
    fn blend_endpoints() {
        let base = Pixel::new(10, 20, 30);
        let layer = Pixel::new(200, 100, 0);
        assert_eq!(base.blend(layer, 0.0), base);
        assert_eq!(base.blend(layer, 1.0), layer);
        assert_eq!(base.blend(layer, 0.5), Pixel::new(105, 60, 15));
    }

    #[test]
    fn to_gray_keeps_dimensions() {
        let image = RgbImage::from_pixel(7, 3, Rgb([50, 100, 150]));
        let gray = to_gray(&image);
        assert_eq!(gray.dimensions(), (7, 3));
        assert_eq!(gray.get_pixel(6, 2)[0], Pixel::new(50, 100, 150).gray());
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        assert!(ensure_same_dimensions((4, 4), (4, 4)).is_ok());
        assert!(ensure_same_dimensions((4, 4), (4, 5)).is_err());
    }
}
