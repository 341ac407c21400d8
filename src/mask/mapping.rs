//! Carrying a mask across pyramid levels.

use image::{GrayImage, Luma};

use crate::error::MaskError;
use crate::slide::Level;

use super::TissueMask;

/// Source index sampled for destination index `dst`.
///
/// Uses the centre of the destination pixel, so upsampling repeats source
/// pixels and downsampling picks one representative per block.
fn source_index(dst: u32, scale: f64, source_len: u32) -> u32 {
    let src = ((dst as f64 + 0.5) * scale).floor();
    (src.max(0.0) as u32).min(source_len.saturating_sub(1))
}

/// Rescale `mask` to the geometry of `target_level`.
///
/// The mask is tagged with its own level; `levels` is the slide's level
/// table. The scale follows the ratio of downsample factors, nearest
/// neighbour in both directions, and the result has exactly the target
/// level's dimensions.
pub fn map_to_level(
    mask: &TissueMask,
    levels: &[Level],
    target_level: usize,
) -> Result<TissueMask, MaskError> {
    let level_count = levels.len();
    let source = levels.get(mask.level()).ok_or(MaskError::LevelOutOfRange {
        level: mask.level(),
        level_count,
    })?;
    let target = levels.get(target_level).ok_or(MaskError::LevelOutOfRange {
        level: target_level,
        level_count,
    })?;

    if target_level == mask.level() && mask.dimensions() == target.dimensions() {
        return Ok(mask.clone());
    }

    let (width, height) = target.dimensions();
    let (source_w, source_h) = mask.dimensions();
    if source_w == 0 || source_h == 0 {
        return Ok(TissueMask::filled(target_level, width, height, false));
    }

    // Source pixels per target pixel
    let scale = target.downsample / source.downsample;
    let columns: Vec<u32> = (0..width)
        .map(|x| source_index(x, scale, source_w))
        .collect();
    let rows: Vec<u32> = (0..height)
        .map(|y| source_index(y, scale, source_h))
        .collect();

    let source_pixels = mask.pixels();
    let pixels = GrayImage::from_fn(width, height, |x, y| {
        Luma([source_pixels.get_pixel(columns[x as usize], rows[y as usize]).0[0]])
    });

    Ok(TissueMask::new(target_level, pixels))
}
