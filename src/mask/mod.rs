//! Tissue masks and the image-analysis stages that produce and apply them.
//!
//! ```text
//! detection raster ──segment──▶ TissueMask ──refine──▶ TissueMask
//!                                                        │
//!                          level raster ◀──composite── map_to_level
//! ```
//!
//! Every stage returns a new value; none mutates its input.

pub mod composite;
pub mod mapping;
pub mod refine;
pub mod segment;

use image::{GrayImage, Luma};

pub use composite::{composite, LevelOutput, BACKGROUND_RGB};
pub use mapping::map_to_level;
pub use refine::{fill_holes, refine, remove_small_components};
pub use segment::{
    blur, effective_threshold, otsu_threshold, segment, to_intensity, SegmentationParams,
    Segmentation,
};

/// Pixel value marking tissue.
pub const TISSUE: u8 = 1;

/// Pixel value marking background.
pub const BACKGROUND: u8 = 0;

/// Binary tissue mask tagged with the level it describes.
///
/// Pixels are exactly [`TISSUE`] or [`BACKGROUND`], and the raster has the
/// dimensions of the tagged level.
#[derive(Debug, Clone, PartialEq)]
pub struct TissueMask {
    level: usize,
    pixels: GrayImage,
}

impl TissueMask {
    /// Wrap a binary raster. Any non-zero value is taken as tissue.
    pub fn new(level: usize, mut pixels: GrayImage) -> Self {
        for p in pixels.pixels_mut() {
            p.0[0] = if p.0[0] == BACKGROUND { BACKGROUND } else { TISSUE };
        }
        Self { level, pixels }
    }

    /// Mask of `width`x`height` with every pixel set to `value`.
    pub fn filled(level: usize, width: u32, height: u32, tissue: bool) -> Self {
        let value = if tissue { TISSUE } else { BACKGROUND };
        Self {
            level,
            pixels: GrayImage::from_pixel(width, height, Luma([value])),
        }
    }

    /// Level index the mask was computed at or mapped to.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn is_tissue(&self, x: u32, y: u32) -> bool {
        self.pixels.get_pixel(x, y).0[0] == TISSUE
    }

    /// Underlying 0/1 raster.
    pub fn pixels(&self) -> &GrayImage {
        &self.pixels
    }

    pub fn tissue_pixels(&self) -> u64 {
        self.pixels.as_raw().iter().filter(|&&v| v == TISSUE).count() as u64
    }

    /// Share of pixels marked as tissue, 0.0 for an empty mask.
    pub fn tissue_fraction(&self) -> f64 {
        let total = self.width() as u64 * self.height() as u64;
        if total == 0 {
            return 0.0;
        }
        self.tissue_pixels() as f64 / total as f64
    }

    /// Snapshot for `--save-mask`: tissue black, background white.
    pub fn to_snapshot(&self) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            Luma([if self.is_tissue(x, y) { 0 } else { 255 }])
        })
    }
}
