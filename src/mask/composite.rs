//! Applying a level-matched mask to a level raster.

use image::{Rgb, RgbImage};

use crate::error::MaskError;

use super::TissueMask;

/// Colour written over background pixels.
pub const BACKGROUND_RGB: Rgb<u8> = Rgb([255, 255, 255]);

/// A composited level, ready for encoding.
#[derive(Debug, Clone)]
pub struct LevelOutput {
    pub level: usize,
    pub raster: RgbImage,

    /// Share of the level covered by the applied mask
    pub tissue_fraction: f64,
}

/// Whiten every pixel of `raster` that `mask` marks as background.
///
/// Tissue pixels pass through unchanged. The mask must already have the
/// raster's dimensions (see [`super::map_to_level`]).
pub fn composite(raster: RgbImage, mask: &TissueMask) -> Result<LevelOutput, MaskError> {
    if raster.dimensions() != mask.dimensions() {
        return Err(MaskError::InvalidParameter {
            name: "mask",
            message: format!(
                "mask of level {} is {:?}, raster is {:?}",
                mask.level(),
                mask.dimensions(),
                raster.dimensions()
            ),
        });
    }

    let mut raster = raster;
    for (pixel, value) in raster.pixels_mut().zip(mask.pixels().as_raw()) {
        if *value != super::TISSUE {
            *pixel = BACKGROUND_RGB;
        }
    }

    Ok(LevelOutput {
        level: mask.level(),
        tissue_fraction: mask.tissue_fraction(),
        raster,
    })
}
