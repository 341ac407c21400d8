//! Format-agnostic slide access.
//!
//! The masking pipeline only needs three things from a slide: the geometry
//! of its levels, a little descriptive metadata, and decoded rasters. The
//! [`SlideReader`] trait is that seam; [`super::TiffSlide`] is the
//! implementation backed by the TIFF parser, and tests substitute in-memory
//! slides.

use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::SlideError;

// =============================================================================
// Level and Region
// =============================================================================

/// Geometry of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub width: u32,
    pub height: u32,

    /// Relative to level 0; exactly 1.0 for level 0, non-decreasing with index
    pub downsample: f64,
}

impl Level {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Rectangle in the pixel coordinates of one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole of a `width`x`height` level.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    fn fits_in(&self, level: &Level) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= level.width as u64
            && self.y as u64 + self.height as u64 <= level.height as u64
    }
}

// =============================================================================
// SlideReader Trait
// =============================================================================

/// Read access to an opened pyramidal slide.
#[async_trait]
pub trait SlideReader: Send + Sync {
    /// Where the slide came from (path or identifier), for logs and metadata.
    fn source(&self) -> &str;

    /// Human-readable format name.
    fn format_name(&self) -> &str;

    /// All levels, index 0 first.
    fn levels(&self) -> &[Level];

    /// Microns per pixel at level 0, when the file records it.
    fn mpp(&self) -> Option<f64> {
        None
    }

    /// Objective magnification, when the file records it.
    fn magnification(&self) -> Option<f64> {
        None
    }

    /// Decode `region` of `level` into an RGB raster of the region's size.
    ///
    /// The region must lie inside the level.
    async fn read_region(&self, level: usize, region: Region) -> Result<RgbImage, SlideError>;

    fn level_count(&self) -> usize {
        self.levels().len()
    }

    /// Geometry of `level`, or `LevelOutOfRange`.
    fn level(&self, level: usize) -> Result<Level, SlideError> {
        self.levels()
            .get(level)
            .copied()
            .ok_or(SlideError::LevelOutOfRange {
                level,
                level_count: self.level_count(),
            })
    }

    fn level_dimensions(&self, level: usize) -> Result<(u32, u32), SlideError> {
        self.level(level).map(|l| l.dimensions())
    }

    fn level_downsample(&self, level: usize) -> Result<f64, SlideError> {
        self.level(level).map(|l| l.downsample)
    }

    /// Dimensions of level 0.
    fn dimensions(&self) -> Option<(u32, u32)> {
        self.levels().first().map(Level::dimensions)
    }

    /// First level whose width and height both fit within `max_dimension`,
    /// or the smallest level when none does.
    fn level_for_max_dimension(&self, max_dimension: u32) -> usize {
        self.levels()
            .iter()
            .position(|l| l.width <= max_dimension && l.height <= max_dimension)
            .unwrap_or_else(|| self.level_count().saturating_sub(1))
    }

    /// Decode a whole level, or one region of it.
    async fn read_level(
        &self,
        level: usize,
        region: Option<Region>,
    ) -> Result<RgbImage, SlideError> {
        let geometry = self.level(level)?;
        let region = region.unwrap_or(Region::full(geometry.width, geometry.height));
        check_region(level, &geometry, &region)?;
        self.read_region(level, region).await
    }
}

/// `RegionOutOfBounds` unless `region` lies inside `geometry`.
pub fn check_region(level: usize, geometry: &Level, region: &Region) -> Result<(), SlideError> {
    if region.fits_in(geometry) {
        return Ok(());
    }
    Err(SlideError::RegionOutOfBounds {
        level,
        x: region.x,
        y: region.y,
        width: region.width,
        height: region.height,
        level_width: geometry.width,
        level_height: geometry.height,
    })
}
