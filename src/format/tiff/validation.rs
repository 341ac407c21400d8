//! Checks that a parsed pyramid can be decoded into RGB rasters.
//!
//! # Supported subset
//!
//! - **Organization**: tiled (strip-only files are rejected)
//! - **Compression**: none or JPEG (abbreviated JPEG streams included)
//! - **Samples**: 8 bits, chunky; 1 (gray), 3 (RGB/YCbCr) or 4 (RGBA)
//!
//! Anything else is reported before a single tile is read.

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::TiffHeader;
use super::pyramid::{PyramidLevel, TiffPyramid};
use super::tags::{Compression, Photometric, TiffTag};
use super::values::ValueReader;

/// Reject pyramids without levels, naming strips when that is the cause.
pub fn validate_pyramid(pyramid: &TiffPyramid) -> Result<(), TiffError> {
    if !pyramid.levels.is_empty() {
        return Ok(());
    }
    if pyramid.other_ifds.iter().any(|(_, ifd)| ifd.is_stripped()) {
        return Err(TiffError::StripOrganization);
    }
    Err(TiffError::MissingTag("TileWidth/TileOffsets (no tiled pyramid level)"))
}

/// Validate one level's pixel layout and compression.
pub async fn validate_level<R: RangeReader>(
    reader: &R,
    header: &TiffHeader,
    level: &PyramidLevel,
) -> Result<(), TiffError> {
    let compression = Compression::from_u16(level.compression);
    if !compression.map(Compression::is_supported).unwrap_or(false) {
        return Err(TiffError::UnsupportedCompression(Compression::describe(
            level.compression,
        )));
    }

    if !matches!(level.samples_per_pixel, 1 | 3 | 4) {
        return Err(TiffError::UnsupportedPixelLayout(format!(
            "{} samples per pixel",
            level.samples_per_pixel
        )));
    }

    if level.samples_per_pixel > 1 && level.planar_configuration != 1 {
        return Err(TiffError::UnsupportedPixelLayout(
            "planar (separate) sample configuration".to_string(),
        ));
    }

    let photometric_ok = match (compression, level.photometric) {
        (Some(Compression::Jpeg), Photometric::Rgb | Photometric::YCbCr) => true,
        (Some(Compression::Jpeg), Photometric::MinIsBlack) => level.samples_per_pixel == 1,
        (Some(Compression::None), Photometric::Rgb) => level.samples_per_pixel >= 3,
        (Some(Compression::None), Photometric::MinIsBlack | Photometric::MinIsWhite) => {
            level.samples_per_pixel == 1
        }
        _ => false,
    };
    if !photometric_ok {
        return Err(TiffError::UnsupportedPixelLayout(format!(
            "{:?} with {} and {} samples",
            level.photometric,
            Compression::describe(level.compression),
            level.samples_per_pixel
        )));
    }

    if let Some(entry) = level.ifd.get_entry_by_tag(TiffTag::BitsPerSample) {
        let bits = ValueReader::new(reader, header).read_u32_array(entry).await?;
        if bits.iter().any(|&b| b != 8) {
            return Err(TiffError::UnsupportedPixelLayout(format!(
                "{:?} bits per sample",
                bits
            )));
        }
    }

    Ok(())
}
