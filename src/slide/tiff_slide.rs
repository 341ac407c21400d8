//! Pyramidal TIFF / Aperio SVS slides.

use async_trait::async_trait;
use image::{GenericImageView, RgbImage};
use tracing::debug;

use crate::error::{FormatError, SlideError};
use crate::format::tiff::{validate_level, validate_pyramid, PyramidLevel, TiffPyramid, TileData};
use crate::format::{blank_tile, decode_tile, detect_format, ensure_tiff, SlideFormat};
use crate::format::{SvsMetadata, TileLayout};
use crate::io::RangeReader;

use super::reader::{Level, Region, SlideReader};

/// Everything needed to decode the tiles of one level.
#[derive(Debug, Clone)]
struct LevelData {
    pyramid: PyramidLevel,
    tiles: TileData,
    layout: TileLayout,
}

/// An opened TIFF-based slide.
///
/// Opening parses the IFD chain, identifies the pyramid, validates that
/// every level can be decoded and loads the tile location tables. Rasters
/// are decoded on demand by [`SlideReader::read_region`].
#[derive(Debug)]
pub struct TiffSlide<R> {
    reader: R,
    format: SlideFormat,
    levels: Vec<Level>,
    level_data: Vec<LevelData>,
    metadata: Option<SvsMetadata>,
}

impl<R: RangeReader> TiffSlide<R> {
    pub async fn open(reader: R) -> Result<Self, SlideError> {
        ensure_tiff(&reader).await?;

        let pyramid = TiffPyramid::parse(&reader).await?;
        validate_pyramid(&pyramid)?;

        let base = &pyramid.levels[0];
        let (format, description) = detect_format(&reader, &pyramid.header, &base.ifd).await?;
        let metadata = match format {
            SlideFormat::AperioSvs => description.as_deref().map(SvsMetadata::parse),
            SlideFormat::GenericTiff => None,
        };

        let mut levels = Vec::with_capacity(pyramid.levels.len());
        let mut level_data = Vec::with_capacity(pyramid.levels.len());
        for level in &pyramid.levels {
            validate_level(&reader, &pyramid.header, level).await?;
            let tiles = TileData::load(&reader, level, &pyramid.header).await?;

            debug!(
                level = level.level_index,
                ifd = level.ifd_index,
                width = level.width,
                height = level.height,
                downsample = level.downsample,
                tile_width = level.tile_width,
                tile_height = level.tile_height,
                "pyramid level"
            );

            levels.push(Level {
                width: level.width,
                height: level.height,
                downsample: level.downsample,
            });
            level_data.push(LevelData {
                layout: TileLayout {
                    tile_width: level.tile_width,
                    tile_height: level.tile_height,
                    compression: level.compression,
                    samples_per_pixel: level.samples_per_pixel,
                    photometric: level.photometric,
                },
                pyramid: level.clone(),
                tiles,
            });
        }

        Ok(TiffSlide {
            reader,
            format,
            levels,
            level_data,
            metadata,
        })
    }

    pub fn format(&self) -> SlideFormat {
        self.format
    }

    /// Aperio metadata, for SVS slides.
    pub fn metadata(&self) -> Option<&SvsMetadata> {
        self.metadata.as_ref()
    }

    /// Tile size of a level.
    pub fn tile_size(&self, level: usize) -> Option<(u32, u32)> {
        self.level_data
            .get(level)
            .map(|d| (d.layout.tile_width, d.layout.tile_height))
    }

    async fn read_tile(
        &self,
        level: usize,
        data: &LevelData,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<RgbImage, SlideError> {
        let decode_error = |message: String| SlideError::Decode {
            level,
            tile_x,
            tile_y,
            message,
        };

        let (offset, byte_count) = data
            .pyramid
            .tile_index(tile_x, tile_y)
            .and_then(|index| data.tiles.get_tile_location(index))
            .ok_or_else(|| decode_error("tile outside the tile grid".to_string()))?;

        if byte_count == 0 {
            return Ok(blank_tile(data.layout.tile_width, data.layout.tile_height));
        }

        let bytes = self
            .reader
            .read_exact_at(offset, byte_count as usize)
            .await
            .map_err(FormatError::from)?;

        decode_tile(&data.layout, data.tiles.jpeg_tables.as_deref(), &bytes).map_err(decode_error)
    }
}

#[async_trait]
impl<R: RangeReader> SlideReader for TiffSlide<R> {
    fn source(&self) -> &str {
        self.reader.identifier()
    }

    fn format_name(&self) -> &str {
        self.format.name()
    }

    fn levels(&self) -> &[Level] {
        &self.levels
    }

    fn mpp(&self) -> Option<f64> {
        self.metadata.as_ref().and_then(|m| m.mpp)
    }

    fn magnification(&self) -> Option<f64> {
        self.metadata.as_ref().and_then(|m| m.magnification)
    }

    async fn read_region(&self, level: usize, region: Region) -> Result<RgbImage, SlideError> {
        let geometry = self.level(level)?;
        super::reader::check_region(level, &geometry, &region)?;
        let data = &self.level_data[level];
        let (tile_w, tile_h) = (data.layout.tile_width, data.layout.tile_height);

        let mut out = blank_tile(region.width, region.height);
        let x_end = region.x + region.width;
        let y_end = region.y + region.height;

        for tile_y in region.y / tile_h..=(y_end - 1) / tile_h {
            for tile_x in region.x / tile_w..=(x_end - 1) / tile_w {
                let tile = self.read_tile(level, data, tile_x, tile_y).await?;
                let origin_x = tile_x * tile_w;
                let origin_y = tile_y * tile_h;

                // Overlap of this tile with the region, clipped to the decoded size
                let left = region.x.max(origin_x);
                let top = region.y.max(origin_y);
                let right = x_end.min(origin_x + tile.width());
                let bottom = y_end.min(origin_y + tile.height());
                if right <= left || bottom <= top {
                    continue;
                }

                let view = tile.view(left - origin_x, top - origin_y, right - left, bottom - top);
                for (x, y, pixel) in view.pixels() {
                    out.put_pixel(left - region.x + x, top - region.y + y, pixel);
                }
            }
        }

        Ok(out)
    }
}
