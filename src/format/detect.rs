//! Slide format detection.
//!
//! - **Aperio SVS**: TIFF whose first ImageDescription mentions "Aperio"
//! - **Generic pyramidal TIFF**: any other TIFF/BigTIFF
//!
//! Anything that is not TIFF at all is rejected as unsupported.

use crate::error::FormatError;
use crate::io::RangeReader;

use super::tiff::{ByteOrder, Ifd, TiffHeader, TiffTag, ValueReader, TIFF_HEADER_SIZE};

// =============================================================================
// SlideFormat
// =============================================================================

/// Detected slide format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideFormat {
    /// Aperio SVS (abbreviated JPEG tiles, metadata in ImageDescription)
    AperioSvs,

    /// Generic pyramidal TIFF
    GenericTiff,
}

impl SlideFormat {
    pub const fn name(&self) -> &'static str {
        match self {
            SlideFormat::AperioSvs => "Aperio SVS",
            SlideFormat::GenericTiff => "Generic Pyramidal TIFF",
        }
    }
}

// =============================================================================
// Format Detection
// =============================================================================

const APERIO_MARKER: &str = "Aperio";

/// Classify a slide from its header and first IFD.
///
/// Returns the format and the first IFD's ImageDescription, which SVS
/// readers parse for metadata.
pub async fn detect_format<R: RangeReader>(
    reader: &R,
    header: &TiffHeader,
    first_ifd: &Ifd,
) -> Result<(SlideFormat, Option<String>), FormatError> {
    let description = read_image_description(reader, header, first_ifd).await?;
    let format = match &description {
        Some(text) if text.contains(APERIO_MARKER) => SlideFormat::AperioSvs,
        _ => SlideFormat::GenericTiff,
    };
    Ok((format, description))
}

/// ImageDescription of `ifd`, `None` if absent or empty.
pub async fn read_image_description<R: RangeReader>(
    reader: &R,
    header: &TiffHeader,
    ifd: &Ifd,
) -> Result<Option<String>, FormatError> {
    let Some(entry) = ifd.get_entry_by_tag(TiffTag::ImageDescription) else {
        return Ok(None);
    };
    let text = ValueReader::new(reader, header).read_string(entry).await?;
    Ok(Some(text).filter(|t| !t.is_empty()))
}

/// Quick check for TIFF/BigTIFF magic and version.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }
    let byte_order = match &bytes[0..2] {
        b"II" => ByteOrder::LittleEndian,
        b"MM" => ByteOrder::BigEndian,
        _ => return false,
    };
    matches!(byte_order.read_u16(&bytes[2..4]), 42 | 43)
}

/// Reject non-TIFF input before attempting a full parse.
pub async fn ensure_tiff<R: RangeReader>(reader: &R) -> Result<(), FormatError> {
    if reader.size() < TIFF_HEADER_SIZE as u64 {
        return Err(FormatError::UnsupportedFormat {
            reason: format!("{} bytes is too small to be a TIFF file", reader.size()),
        });
    }
    let magic = reader.read_exact_at(0, TIFF_HEADER_SIZE).await?;
    if !is_tiff_header(&magic) {
        return Err(FormatError::UnsupportedFormat {
            reason: "not a TIFF/BigTIFF file".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
