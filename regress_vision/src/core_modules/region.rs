// THEORY (Region Analyzer):
// A change mask is a set of blobs. Reviewers want a short list of rectangles,
// not a pixel count, so every outer contour of the mask becomes a `Region`:
//
//   - only outer borders count; holes inside a blob are part of that blob;
//   - the contour is reduced to its corner points (runs of collinear points
//     collapse to their endpoints), and its enclosed area is measured with
//     the shoelace formula over that polygon;
//   - blobs enclosing less than `min_area` are noise and are dropped.
//
// Because the filter is a plain `area >= min_area` test on fixed areas, raising
// `min_area` can only remove regions, never add them.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::contours::{BorderType, Contour, find_contours};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Area enclosed by the simplified contour, in square pixels.
    pub area: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxStyle {
    pub color: [u8; 3],
    pub thickness: u32,
}

impl Default for BoxStyle {
    fn default() -> Self {
        Self {
            color: [0, 255, 0],
            thickness: 2,
        }
    }
}

/// Changed regions of `mask` enclosing at least `min_area`, in discovery order.
pub fn find_regions(mask: &GrayImage, min_area: f64) -> Vec<Region> {
    let contours: Vec<Contour<i64>> = find_contours(mask);
    let regions: Vec<Region> = contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(region_of)
        .filter(|r| r.area >= min_area)
        .collect();
    tracing::debug!(regions = regions.len(), min_area, "regions extracted");
    regions
}

fn region_of(contour: &Contour<i64>) -> Option<Region> {
    let points: Vec<(i64, i64)> = contour.points.iter().map(|p| (p.x, p.y)).collect();
    let (min_x, max_x) = points.iter().map(|p| p.0).fold(None, extend)?;
    let (min_y, max_y) = points.iter().map(|p| p.1).fold(None, extend)?;

    Some(Region {
        x: min_x as u32,
        y: min_y as u32,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
        area: polygon_area(&simplify(&points)),
    })
}

fn extend(range: Option<(i64, i64)>, v: i64) -> Option<(i64, i64)> {
    Some(match range {
        Some((lo, hi)) => (lo.min(v), hi.max(v)),
        None => (v, v),
    })
}

/// Drops points that lie on a straight run between their neighbours.
pub fn simplify(points: &[(i64, i64)]) -> Vec<(i64, i64)> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }
    (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let cur = points[i];
            let next = points[(i + 1) % n];
            let (ax, ay) = (cur.0 - prev.0, cur.1 - prev.1);
            let (bx, by) = (next.0 - cur.0, next.1 - cur.1);
            let collinear = ax * by - ay * bx == 0 && ax * bx + ay * by > 0;
            !collinear
        })
        .map(|i| points[i])
        .collect()
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(points: &[(i64, i64)]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: i64 = (0..n)
        .map(|i| {
            let (x0, y0) = points[i];
            let (x1, y1) = points[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum();
    twice.abs() as f64 / 2.0
}

/// Outlines each region with a box `thickness` pixels wide, growing inward.
pub fn draw_regions(image: &mut RgbImage, regions: &[Region], style: &BoxStyle) -> usize {
    let color = Rgb(style.color);
    for region in regions {
        for inset in 0..style.thickness.max(1) {
            let (Some(w), Some(h)) = (
                region.width.checked_sub(2 * inset).filter(|&w| w > 0),
                region.height.checked_sub(2 * inset).filter(|&h| h > 0),
            ) else {
                break;
            };
            let rect = Rect::at((region.x + inset) as i32, (region.y + inset) as i32).of_size(w, h);
            draw_hollow_rect_mut(image, rect, color);
        }
    }
    regions.len()
}

/// Finds, filters and draws regions onto `image`; returns how many were drawn.
pub fn annotate(image: &mut RgbImage, mask: &GrayImage, min_area: f64, style: &BoxStyle) -> usize {
    let regions = find_regions(mask, min_area);
    draw_regions(image, &regions, style)
}
