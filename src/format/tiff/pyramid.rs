//! Pyramid level discovery.
//!
//! A slide file chains many IFDs together: the resolution levels, plus
//! extras such as a stripped thumbnail, the label and the macro photo. The
//! levels are the tiled IFDs; they are ordered by area and kept only when
//! their aspect ratio agrees with the largest one.
//!
//! Downsample factors are the mean of the width and height ratios to level 0,
//! which is what slide readers conventionally report.

use bytes::Bytes;
use tracing::debug;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE};
use super::tags::{Photometric, TiffTag};
use super::values::ValueReader;

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of IFDs to follow (guards against offset cycles)
const MAX_IFDS: usize = 256;

/// Relative disagreement allowed between the x and y downsample of a level
const ASPECT_TOLERANCE: f64 = 0.1;

/// NewSubfileType bit marking a transparency mask
const SUBFILE_TRANSPARENCY_MASK: u32 = 4;

// =============================================================================
// PyramidLevel
// =============================================================================

/// A single resolution level backed by one tiled IFD.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    /// Index in the pyramid (0 = highest resolution)
    pub level_index: usize,

    /// Index of the IFD in the file's IFD chain
    pub ifd_index: usize,

    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub tile_count: u32,

    /// Downsample factor relative to level 0 (exactly 1.0 for level 0)
    pub downsample: f64,

    /// Raw Compression tag value
    pub compression: u16,
    pub samples_per_pixel: u16,
    pub photometric: Photometric,
    pub planar_configuration: u16,

    pub ifd: Ifd,
    pub tile_offsets_entry: IfdEntry,
    pub tile_byte_counts_entry: IfdEntry,
    pub jpeg_tables_entry: Option<IfdEntry>,
}

impl PyramidLevel {
    /// Build a level from an IFD; `None` unless it is tiled with locatable tiles.
    fn from_ifd(ifd: Ifd, ifd_index: usize, byte_order: ByteOrder) -> Option<Self> {
        let tile_width = ifd.tile_width(byte_order).filter(|&w| w > 0)?;
        let tile_height = ifd.tile_height(byte_order).filter(|&h| h > 0)?;
        let width = ifd.image_width(byte_order).filter(|&w| w > 0)?;
        let height = ifd.image_height(byte_order).filter(|&h| h > 0)?;
        let tile_offsets_entry = ifd.get_entry_by_tag(TiffTag::TileOffsets)?.clone();
        let tile_byte_counts_entry = ifd.get_entry_by_tag(TiffTag::TileByteCounts)?.clone();

        let subfile = ifd
            .get_u32(TiffTag::NewSubfileType, byte_order)
            .unwrap_or(0);
        if subfile & SUBFILE_TRANSPARENCY_MASK != 0 {
            return None;
        }

        let samples_per_pixel = ifd.samples_per_pixel(byte_order);
        // Without the tag, three samples are RGB and one is grayscale
        let photometric = match ifd.photometric_interpretation(byte_order) {
            Some(value) => Photometric::from_u16(value),
            None if samples_per_pixel >= 3 => Photometric::Rgb,
            None => Photometric::MinIsBlack,
        };

        let tiles_x = width.div_ceil(tile_width);
        let tiles_y = height.div_ceil(tile_height);

        Some(PyramidLevel {
            level_index: 0,
            ifd_index,
            width,
            height,
            tile_width,
            tile_height,
            tiles_x,
            tiles_y,
            tile_count: tiles_x * tiles_y,
            downsample: 1.0,
            compression: ifd.compression(byte_order),
            samples_per_pixel,
            photometric,
            planar_configuration: ifd.planar_configuration(byte_order),
            jpeg_tables_entry: ifd.get_entry_by_tag(TiffTag::JpegTables).cloned(),
            ifd,
            tile_offsets_entry,
            tile_byte_counts_entry,
        })
    }

    /// Row-major tile index, `None` when out of the tile grid.
    pub fn tile_index(&self, tile_x: u32, tile_y: u32) -> Option<u32> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        Some(tile_y * self.tiles_x + tile_x)
    }

    /// Pixels of the tile that lie inside the image.
    ///
    /// Edge tiles are stored padded to the full tile size; only this part of
    /// them is image content.
    pub fn tile_dimensions(&self, tile_x: u32, tile_y: u32) -> Option<(u32, u32)> {
        self.tile_index(tile_x, tile_y)?;
        let w = std::cmp::min(self.tile_width, self.width - tile_x * self.tile_width);
        let h = std::cmp::min(self.tile_height, self.height - tile_y * self.tile_height);
        Some((w, h))
    }

    fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

// =============================================================================
// TiffPyramid
// =============================================================================

/// The resolution levels of a TIFF slide.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    pub header: TiffHeader,

    /// Levels sorted by resolution (0 = highest)
    pub levels: Vec<PyramidLevel>,

    /// IFDs that are not pyramid levels (thumbnail, label, macro, ...)
    pub other_ifds: Vec<(usize, Ifd)>,
}

impl TiffPyramid {
    /// Read the header and IFD chain and identify the pyramid.
    pub async fn parse<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let header_len = std::cmp::min(BIGTIFF_HEADER_SIZE as u64, reader.size()) as usize;
        let header_bytes = reader.read_exact_at(0, header_len).await?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let ifds = Self::parse_all_ifds(reader, &header).await?;
        Ok(Self::build_pyramid(header, ifds))
    }

    /// Follow the next-IFD chain from the header.
    pub async fn parse_all_ifds<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
    ) -> Result<Vec<Ifd>, TiffError> {
        let mut ifds = Vec::new();
        let mut visited = Vec::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && ifds.len() < MAX_IFDS {
            if visited.contains(&offset) {
                return Err(TiffError::InvalidIfdOffset(offset));
            }
            visited.push(offset);

            let count_bytes = reader
                .read_exact_at(offset, header.ifd_count_size())
                .await?;
            let entry_count = header.read_entry_count(&count_bytes)?;
            let ifd_size = Ifd::calculate_size(entry_count, header);
            let ifd_bytes = reader.read_exact_at(offset, ifd_size).await?;
            let ifd = Ifd::parse(&ifd_bytes, header)?;

            offset = ifd.next_ifd_offset;
            ifds.push(ifd);
        }

        Ok(ifds)
    }

    /// Split IFDs into pyramid levels and everything else.
    pub fn build_pyramid(header: TiffHeader, ifds: Vec<Ifd>) -> Self {
        let byte_order = header.byte_order;
        let mut candidates = Vec::new();
        let mut other_ifds = Vec::new();

        for (ifd_index, ifd) in ifds.into_iter().enumerate() {
            match PyramidLevel::from_ifd(ifd.clone(), ifd_index, byte_order) {
                Some(level) => candidates.push(level),
                None => other_ifds.push((ifd_index, ifd)),
            }
        }

        // Stable sort keeps file order among equal areas
        candidates.sort_by(|a, b| b.area().cmp(&a.area()));

        let mut levels: Vec<PyramidLevel> = Vec::new();
        for mut level in candidates {
            let Some(base) = levels.first() else {
                level.downsample = 1.0;
                levels.push(level);
                continue;
            };

            let downsample_x = base.width as f64 / level.width as f64;
            let downsample_y = base.height as f64 / level.height as f64;
            let last_area = levels.last().map(|l| l.area()).unwrap_or(u64::MAX);

            if level.area() >= last_area || !consistent_aspect(base, &level) {
                debug!(
                    ifd = level.ifd_index,
                    width = level.width,
                    height = level.height,
                    "tiled IFD is not a pyramid level"
                );
                other_ifds.push((level.ifd_index, level.ifd));
                continue;
            }

            level.level_index = levels.len();
            level.downsample = (downsample_x + downsample_y) / 2.0;
            levels.push(level);
        }

        other_ifds.sort_by_key(|(index, _)| *index);

        TiffPyramid {
            header,
            levels,
            other_ifds,
        }
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn base_level(&self) -> Option<&PyramidLevel> {
        self.levels.first()
    }

    /// Dimensions of level 0.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.base_level().map(|l| (l.width, l.height))
    }
}

/// Whether `level` has the same shape as `base` up to per-axis rounding.
fn consistent_aspect(base: &PyramidLevel, level: &PyramidLevel) -> bool {
    let downsample_x = base.width as f64 / level.width as f64;
    let downsample_y = base.height as f64 / level.height as f64;

    let relative = (downsample_x - downsample_y).abs() / downsample_x.max(downsample_y);
    if relative <= ASPECT_TOLERANCE {
        return true;
    }

    // Tiny levels: one pixel of rounding can swing the ratio a lot
    let expected_height = base.height as f64 / downsample_x;
    (expected_height - level.height as f64).abs() <= 1.0
}

// =============================================================================
// Tile Data Loading
// =============================================================================

/// Tile location tables of one pyramid level.
#[derive(Debug, Clone)]
pub struct TileData {
    /// Byte offset of each tile in the file
    pub offsets: Vec<u64>,

    /// Byte count of each tile; 0 marks a sparse (absent) tile
    pub byte_counts: Vec<u64>,

    /// Shared JPEGTables for abbreviated tile streams
    pub jpeg_tables: Option<Bytes>,
}

impl TileData {
    /// Load the offset/byte-count arrays and JPEGTables of `level`.
    pub async fn load<R: RangeReader>(
        reader: &R,
        level: &PyramidLevel,
        header: &TiffHeader,
    ) -> Result<Self, TiffError> {
        let values = ValueReader::new(reader, header);

        let offsets = values.read_u64_array(&level.tile_offsets_entry).await?;
        let byte_counts = values.read_u64_array(&level.tile_byte_counts_entry).await?;

        let expected = level.tile_count as usize;
        if offsets.len() < expected || byte_counts.len() < expected {
            return Err(TiffError::InvalidTagValue {
                tag: "TileOffsets/TileByteCounts",
                message: format!(
                    "level {} needs {} tiles, found {} offsets and {} byte counts",
                    level.level_index,
                    expected,
                    offsets.len(),
                    byte_counts.len()
                ),
            });
        }

        let jpeg_tables = match &level.jpeg_tables_entry {
            Some(entry) => Some(values.read_raw_bytes(entry).await?),
            None => None,
        };

        Ok(TileData {
            offsets,
            byte_counts,
            jpeg_tables,
        })
    }

    /// `(offset, byte_count)` of a tile.
    pub fn get_tile_location(&self, tile_index: u32) -> Option<(u64, u64)> {
        let idx = tile_index as usize;
        Some((*self.offsets.get(idx)?, *self.byte_counts.get(idx)?))
    }
}

// =============================================================================
// Tests
// =============================================================================
