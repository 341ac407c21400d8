//! Decoding stored tiles into RGB rasters.

use image::{ImageFormat, Rgb, RgbImage};

use super::jpeg::prepare_tile_jpeg;
use super::tiff::{Compression, Photometric};

/// How the tiles of one level are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    pub tile_width: u32,
    pub tile_height: u32,
    pub compression: u16,
    pub samples_per_pixel: u16,
    pub photometric: Photometric,
}

/// Decode one tile payload to an RGB raster of the full tile size.
///
/// JPEG tiles that decode to a different size are accepted as-is; callers
/// only copy the overlap with the image.
pub fn decode_tile(
    layout: &TileLayout,
    jpeg_tables: Option<&[u8]>,
    data: &[u8],
) -> Result<RgbImage, String> {
    match Compression::from_u16(layout.compression) {
        Some(Compression::None) => decode_uncompressed(layout, data),
        Some(Compression::Jpeg) => {
            let rgb_components =
                layout.photometric == Photometric::Rgb && layout.samples_per_pixel >= 3;
            let stream = prepare_tile_jpeg(jpeg_tables, data, rgb_components);
            let decoded = image::load_from_memory_with_format(&stream, ImageFormat::Jpeg)
                .map_err(|e| e.to_string())?;
            Ok(decoded.to_rgb8())
        }
        _ => Err(format!(
            "unsupported compression {}",
            Compression::describe(layout.compression)
        )),
    }
}

fn decode_uncompressed(layout: &TileLayout, data: &[u8]) -> Result<RgbImage, String> {
    let samples = layout.samples_per_pixel as usize;
    let pixels = layout.tile_width as usize * layout.tile_height as usize;
    let needed = pixels * samples;
    if data.len() < needed {
        return Err(format!(
            "tile holds {} bytes, {}x{}x{} needs {}",
            data.len(),
            layout.tile_width,
            layout.tile_height,
            samples,
            needed
        ));
    }

    let invert = layout.photometric == Photometric::MinIsWhite;
    let mut raw = Vec::with_capacity(pixels * 3);
    for px in data[..needed].chunks_exact(samples) {
        match samples {
            1 => {
                let v = if invert { 255 - px[0] } else { px[0] };
                raw.extend_from_slice(&[v, v, v]);
            }
            _ => raw.extend_from_slice(&px[..3]),
        }
    }

    RgbImage::from_raw(layout.tile_width, layout.tile_height, raw)
        .ok_or_else(|| "tile buffer size mismatch".to_string())
}

/// Raster of `width`x`height` filled with white, used for sparse tiles.
pub fn blank_tile(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([255, 255, 255]))
}
