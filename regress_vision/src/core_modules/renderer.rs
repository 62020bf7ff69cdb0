// THEORY (Artifact Renderer):
// Three pictures for a human reviewer, each a pure function of its inputs:
//
//   overlay  - the baseline with every changed pixel tinted (red by default)
//   bboxes   - the overlay with a rectangle around every significant region
//   heatmap  - the raw difference colored cold -> hot and laid over the
//              baseline, so faint changes that did not survive the mask are
//              still visible
//
// Unchanged pixels of the overlay are left exactly as they are in the baseline.

use crate::core_modules::pixel::pixel::{Pixel, ensure_same_dimensions};
use crate::core_modules::region::{self, BoxStyle, Region};
use crate::error::Result;
use image::{GrayImage, Rgb, RgbImage};

/// Tints the pixels set in `mask` with `color` at opacity `alpha`.
pub fn overlay(base: &RgbImage, mask: &GrayImage, color: [u8; 3], alpha: f32) -> Result<RgbImage> {
    ensure_same_dimensions(base.dimensions(), mask.dimensions())?;
    let tint = Pixel::from(color);
    Ok(RgbImage::from_fn(base.width(), base.height(), |x, y| {
        let original = base.get_pixel(x, y);
        if mask.get_pixel(x, y)[0] == 0 {
            *original
        } else {
            Pixel::from(original).blend(tint, alpha).into()
        }
    }))
}

/// A copy of `overlay` with boxes around the regions of `mask`.
pub fn bounding_box_overlay(
    overlay: &RgbImage,
    mask: &GrayImage,
    min_area: f64,
    style: &BoxStyle,
) -> Result<(RgbImage, Vec<Region>)> {
    ensure_same_dimensions(overlay.dimensions(), mask.dimensions())?;
    let regions = region::find_regions(mask, min_area);
    let mut annotated = overlay.clone();
    region::draw_regions(&mut annotated, &regions, style);
    Ok((annotated, regions))
}

/// Jet-style ramp: dark blue, blue, cyan, yellow, red, dark red.
pub fn heat_color(value: u8) -> Rgb<u8> {
    let v = value as f32 / 255.0;
    let channel = |center: f32| -> u8 {
        let intensity = (1.5 - (4.0 * v - center).abs()).clamp(0.0, 1.0);
        (intensity * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// Colors `diff` with `heat_color` and blends it over `base` at opacity `alpha`.
pub fn heatmap(diff: &GrayImage, base: &RgbImage, alpha: f32) -> Result<RgbImage> {
    ensure_same_dimensions(base.dimensions(), diff.dimensions())?;
    Ok(RgbImage::from_fn(base.width(), base.height(), |x, y| {
        let heat = heat_color(diff.get_pixel(x, y)[0]);
        Pixel::from(base.get_pixel(x, y)).blend(Pixel::from(&heat), alpha).into()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn square_mask(size: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if (10..30).contains(&x) && (10..30).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn overlay_tints_only_changed_pixels() {
        let base = RgbImage::from_pixel(40, 40, Rgb([100, 100, 100]));
        let tinted = overlay(&base, &square_mask(40), [255, 0, 0], 0.4).expect("overlay");
        assert_eq!(tinted.get_pixel(0, 0), &Rgb([100, 100, 100]));
        assert_eq!(tinted.get_pixel(20, 20), &Rgb([162, 60, 60]));
    }

    #[test]
    fn renderers_do_not_touch_their_inputs() {
        let base = RgbImage::from_pixel(40, 40, Rgb([10, 20, 30]));
        let mask = square_mask(40);
        let (base_copy, mask_copy) = (base.clone(), mask.clone());

        let tinted = overlay(&base, &mask, [255, 0, 0], 0.4).expect("overlay");
        let tinted_copy = tinted.clone();
        let (boxed, regions) = bounding_box_overlay(&tinted, &mask, 100.0, &BoxStyle::default()).expect("boxes");
        let _ = heatmap(&mask, &base, 0.6).expect("heatmap");

        assert_eq!(base, base_copy);
        assert_eq!(mask, mask_copy);
        assert_eq!(tinted, tinted_copy);
        assert_eq!(regions.len(), 1);
        assert_ne!(boxed, tinted);
        assert_eq!(boxed.get_pixel(10, 10), &Rgb([0, 255, 0]));
    }

    #[test]
    fn small_regions_get_no_box() {
        let base = RgbImage::new(40, 40);
        let (boxed, regions) = bounding_box_overlay(&base, &square_mask(40), 1000.0, &BoxStyle::default())
            .expect("boxes");
        assert!(regions.is_empty());
        assert_eq!(boxed, base);
    }

    #[test]
    fn heat_ramp_runs_cold_to_hot() {
        assert_eq!(heat_color(0), Rgb([0, 0, 128]));
        assert_eq!(heat_color(255), Rgb([128, 0, 0]));
        let mid = heat_color(128);
        assert!(mid[1] > 200);
        let cold = heat_color(40);
        let hot = heat_color(215);
        assert!(cold[2] > cold[0]);
        assert!(hot[0] > hot[2]);
    }

    #[test]
    fn heatmap_of_zero_diff_is_a_uniform_tint() {
        let base = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        let heat = heatmap(&GrayImage::new(8, 8), &base, 0.6).expect("heatmap");
        assert!(heat.pixels().all(|p| *p == Rgb([0, 0, 77])));
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let base = RgbImage::new(10, 10);
        assert!(overlay(&base, &GrayImage::new(9, 10), [255, 0, 0], 0.4).is_err());
        assert!(heatmap(&GrayImage::new(10, 11), &base, 0.6).is_err());
    }
}
