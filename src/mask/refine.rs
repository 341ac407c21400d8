//! Mask cleanup: artifact removal and hole filling.
//!
//! Tissue components are 8-connected. Background components are
//! 4-connected, so a diagonal gap in a tissue outline does not let a hole
//! leak out to the border.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use tracing::debug;

use super::{TissueMask, BACKGROUND, TISSUE};

pub const DEFAULT_MIN_AREA: u64 = 10;

type Labels = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Label the pixels equal to `value`; every other pixel gets label 0.
fn label_pixels(mask: &GrayImage, value: u8, connectivity: Connectivity) -> (Labels, usize) {
    let selected = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([u8::from(mask.get_pixel(x, y).0[0] == value)])
    });
    let labels = connected_components(&selected, connectivity, Luma([0u8]));
    let count = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    (labels, count)
}

/// Pixel count of every label, indexed by label.
fn component_areas(labels: &Labels, count: usize) -> Vec<u64> {
    let mut areas = vec![0u64; count + 1];
    for p in labels.pixels() {
        areas[p.0[0] as usize] += 1;
    }
    areas
}

/// Drop every tissue component smaller than `min_area` pixels.
///
/// Components of at least `min_area` pixels keep their exact shape.
pub fn remove_small_components(mask: &TissueMask, min_area: u64) -> TissueMask {
    let (labels, count) = label_pixels(mask.pixels(), TISSUE, Connectivity::Eight);
    let areas = component_areas(&labels, count);

    let pixels = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        let label = labels.get_pixel(x, y).0[0] as usize;
        Luma([if label != 0 && areas[label] >= min_area {
            TISSUE
        } else {
            BACKGROUND
        }])
    });

    let removed = areas[1..].iter().filter(|&&a| a < min_area).count();
    debug!(components = count, removed, min_area, "Removed small tissue components");

    TissueMask::new(mask.level(), pixels)
}

/// Turn background regions enclosed by tissue into tissue.
///
/// A background component is enclosed when none of its pixels lies on the
/// image border; components touching the border are left alone.
pub fn fill_holes(mask: &TissueMask) -> TissueMask {
    let (width, height) = mask.dimensions();
    let (labels, count) = label_pixels(mask.pixels(), BACKGROUND, Connectivity::Four);

    let mut reaches_border = vec![false; count + 1];
    for (x, y, p) in labels.enumerate_pixels() {
        if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
            reaches_border[p.0[0] as usize] = true;
        }
    }

    let pixels = GrayImage::from_fn(width, height, |x, y| {
        let label = labels.get_pixel(x, y).0[0] as usize;
        let hole = label != 0 && !reaches_border[label];
        Luma([if hole || mask.is_tissue(x, y) {
            TISSUE
        } else {
            BACKGROUND
        }])
    });

    let holes = reaches_border[1..].iter().filter(|&&b| !b).count();
    debug!(holes, "Filled enclosed background");

    TissueMask::new(mask.level(), pixels)
}

/// Artifact removal followed by hole filling. The input is left untouched.
pub fn refine(mask: &TissueMask, min_area: u64) -> TissueMask {
    fill_holes(&remove_small_components(mask, min_area))
}
