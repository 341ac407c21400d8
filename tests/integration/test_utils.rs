//! Test utilities for integration tests.
//!
//! Synthetic slides are built in memory as real tiled TIFF files (classic
//! or BigTIFF, either byte order) and written to a temporary directory, so
//! the tests exercise the same open/parse/decode path as a slide on disk.

use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, Rgb, RgbImage};

// =============================================================================
// Test Images
// =============================================================================

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const TISSUE: Rgb<u8> = Rgb([120, 60, 140]);

/// White background with a dark disc centred at (`cx`, `cy`).
pub fn disc_image(width: u32, height: u32, cx: f64, cy: f64, radius: f64) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let dx = x as f64 + 0.5 - cx;
        let dy = y as f64 + 0.5 - cy;
        if dx * dx + dy * dy <= radius * radius {
            TISSUE
        } else {
            WHITE
        }
    })
}

/// A pyramid of `count` levels, each a quarter of the previous one per side.
///
/// Level 0 is `width`x`height` with a disc covering its centre; lower levels
/// are resized copies so every level shows the same tissue.
pub fn disc_pyramid(width: u32, height: u32, count: usize) -> Vec<RgbImage> {
    let base = disc_image(
        width,
        height,
        width as f64 / 2.0,
        height as f64 / 2.0,
        width.min(height) as f64 / 3.0,
    );
    let mut levels = vec![base];
    for i in 1..count {
        let factor = 4u32.pow(i as u32);
        let w = (width / factor).max(1);
        let h = (height / factor).max(1);
        let reduced = imageops::resize(&levels[0], w, h, imageops::FilterType::Nearest);
        levels.push(reduced);
    }
    levels
}

/// Encode an RGB image as a baseline JPEG.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode_image(image).unwrap();
    buf
}

// =============================================================================
// Slide Builder
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrderType {
    LittleEndian,
    BigEndian,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileEncoding {
    /// Uncompressed chunky RGB
    Raw,
    /// One complete JPEG stream per tile (YCbCr)
    Jpeg,
}

/// Builder for tiled pyramidal TIFF files.
///
/// Each level becomes one tiled IFD, chained in level order. Edge tiles are
/// padded with white to the full tile size, as slide writers do.
pub struct SlideBuilder {
    levels: Vec<RgbImage>,
    tile_size: u32,
    encoding: TileEncoding,
    byte_order: ByteOrderType,
    is_bigtiff: bool,
    description: Option<String>,
    sparse: Vec<(usize, usize)>,
}

impl SlideBuilder {
    pub fn new(levels: Vec<RgbImage>) -> Self {
        Self {
            levels,
            tile_size: 16,
            encoding: TileEncoding::Raw,
            byte_order: ByteOrderType::LittleEndian,
            is_bigtiff: false,
            description: None,
            sparse: Vec::new(),
        }
    }

    pub fn tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn encoding(mut self, encoding: TileEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn big_endian(mut self) -> Self {
        self.byte_order = ByteOrderType::BigEndian;
        self
    }

    pub fn bigtiff(mut self) -> Self {
        self.is_bigtiff = true;
        self
    }

    /// ImageDescription of the first IFD.
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Aperio-style description, which makes the file detect as SVS.
    pub fn aperio(self, mpp: f64, magnification: u32) -> Self {
        let (w, h) = self.levels[0].dimensions();
        self.description(format!(
            "Aperio Image Library v12.0.5\n{w}x{h} [0,0 {w}x{h}] (256x256) JPEG/RGB Q=70|AppMag = {magnification}|MPP = {mpp}"
        ))
    }

    /// Store the tile at `index` of `level` as absent (zero byte count).
    pub fn sparse_tile(mut self, level: usize, index: usize) -> Self {
        self.sparse.push((level, index));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut data = Vec::new();
        let order = self.byte_order;

        // Header; the first-IFD pointer is patched once the IFD is placed
        match order {
            ByteOrderType::LittleEndian => data.extend_from_slice(b"II"),
            ByteOrderType::BigEndian => data.extend_from_slice(b"MM"),
        }
        let mut next_pointer = if self.is_bigtiff {
            write_value(&mut data, order, 43, 2);
            write_value(&mut data, order, 8, 2);
            write_value(&mut data, order, 0, 2);
            let at = data.len();
            write_value(&mut data, order, 0, 8);
            at
        } else {
            write_value(&mut data, order, 42, 2);
            let at = data.len();
            write_value(&mut data, order, 0, 4);
            at
        };

        for (level_index, image) in self.levels.iter().enumerate() {
            let (offsets, byte_counts) = self.write_tiles(&mut data, level_index, image);
            let entries = self.level_entries(level_index, image, offsets, byte_counts);
            let ifd_offset = self.write_ifd(&mut data, entries);
            self.patch(&mut data, next_pointer, ifd_offset);
            next_pointer = data.len() - self.offset_size();
        }

        data
    }

    /// Write the file to `dir/name` and return its path.
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }

    fn offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    fn patch(&self, data: &mut [u8], at: usize, value: u64) {
        let mut bytes = Vec::new();
        write_value(&mut bytes, self.byte_order, value, self.offset_size());
        data[at..at + bytes.len()].copy_from_slice(&bytes);
    }

    fn write_tiles(&self, data: &mut Vec<u8>, level: usize, image: &RgbImage) -> (Vec<u64>, Vec<u64>) {
        let tile = self.tile_size;
        let tiles_x = image.width().div_ceil(tile);
        let tiles_y = image.height().div_ceil(tile);

        let mut offsets = Vec::new();
        let mut byte_counts = Vec::new();
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let index = (ty * tiles_x + tx) as usize;
                if self.sparse.contains(&(level, index)) {
                    offsets.push(0);
                    byte_counts.push(0);
                    continue;
                }

                let mut padded = RgbImage::from_pixel(tile, tile, WHITE);
                let w = tile.min(image.width() - tx * tile);
                let h = tile.min(image.height() - ty * tile);
                let view = imageops::crop_imm(image, tx * tile, ty * tile, w, h).to_image();
                imageops::replace(&mut padded, &view, 0, 0);

                let payload = match self.encoding {
                    TileEncoding::Raw => padded.into_raw(),
                    TileEncoding::Jpeg => encode_jpeg(&padded, 95),
                };
                align(data);
                offsets.push(data.len() as u64);
                byte_counts.push(payload.len() as u64);
                data.extend_from_slice(&payload);
            }
        }
        (offsets, byte_counts)
    }

    fn level_entries(
        &self,
        level: usize,
        image: &RgbImage,
        offsets: Vec<u64>,
        byte_counts: Vec<u64>,
    ) -> Vec<Entry> {
        let (compression, photometric) = match self.encoding {
            TileEncoding::Raw => (1, 2),
            TileEncoding::Jpeg => (7, 6),
        };
        let array_type = if self.is_bigtiff { LONG8 } else { LONG };

        let mut entries = vec![
            Entry::numbers(254, LONG, &[if level == 0 { 0 } else { 1 }]),
            Entry::numbers(256, LONG, &[image.width() as u64]),
            Entry::numbers(257, LONG, &[image.height() as u64]),
            Entry::numbers(258, SHORT, &[8, 8, 8]),
            Entry::numbers(259, SHORT, &[compression]),
            Entry::numbers(262, SHORT, &[photometric]),
            Entry::numbers(277, SHORT, &[3]),
            Entry::numbers(284, SHORT, &[1]),
            Entry::numbers(322, SHORT, &[self.tile_size as u64]),
            Entry::numbers(323, SHORT, &[self.tile_size as u64]),
            Entry::numbers(324, array_type, &offsets),
            Entry::numbers(325, array_type, &byte_counts),
        ];
        if level == 0 {
            if let Some(text) = &self.description {
                entries.push(Entry::ascii(270, text));
            }
        }
        entries.sort_by_key(|e| e.tag);
        entries
    }

    /// Write out-of-line values, then the IFD itself. Returns the IFD offset.
    fn write_ifd(&self, data: &mut Vec<u8>, entries: Vec<Entry>) -> u64 {
        let order = self.byte_order;
        let inline_size = self.offset_size();

        let mut encoded = Vec::with_capacity(entries.len());
        for entry in &entries {
            let mut value = Vec::new();
            for &v in &entry.values {
                write_value(&mut value, order, v, field_type_size(entry.field_type));
            }
            if let Some(bytes) = &entry.bytes {
                value = bytes.clone();
            }

            if value.len() > inline_size {
                align(data);
                let at = data.len() as u64;
                data.extend_from_slice(&value);
                let mut pointer = Vec::new();
                write_value(&mut pointer, order, at, inline_size);
                encoded.push((entry, pointer));
            } else {
                value.resize(inline_size, 0);
                encoded.push((entry, value));
            }
        }

        align(data);
        let ifd_offset = data.len() as u64;
        if self.is_bigtiff {
            write_value(data, order, entries.len() as u64, 8);
        } else {
            write_value(data, order, entries.len() as u64, 2);
        }
        for (entry, value) in encoded {
            write_value(data, order, entry.tag as u64, 2);
            write_value(data, order, entry.field_type as u64, 2);
            write_value(data, order, entry.count(), inline_size);
            data.extend_from_slice(&value);
        }
        write_value(data, order, 0, inline_size);
        ifd_offset
    }
}

// =============================================================================
// IFD Entries
// =============================================================================

const ASCII: u16 = 2;
const SHORT: u16 = 3;
const LONG: u16 = 4;
const LONG8: u16 = 16;

struct Entry {
    tag: u16,
    field_type: u16,
    values: Vec<u64>,
    bytes: Option<Vec<u8>>,
}

impl Entry {
    fn numbers(tag: u16, field_type: u16, values: &[u64]) -> Self {
        Self {
            tag,
            field_type,
            values: values.to_vec(),
            bytes: None,
        }
    }

    fn ascii(tag: u16, text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        Self {
            tag,
            field_type: ASCII,
            values: Vec::new(),
            bytes: Some(bytes),
        }
    }

    fn count(&self) -> u64 {
        match &self.bytes {
            Some(bytes) => bytes.len() as u64,
            None => self.values.len() as u64,
        }
    }
}

fn field_type_size(field_type: u16) -> usize {
    match field_type {
        1 | 2 | 6 | 7 => 1,
        3 | 8 => 2,
        4 | 9 | 11 => 4,
        _ => 8,
    }
}

/// Word-align the next write.
fn align(data: &mut Vec<u8>) {
    if data.len() % 2 == 1 {
        data.push(0);
    }
}

fn write_value(data: &mut Vec<u8>, byte_order: ByteOrderType, value: u64, size: usize) {
    match byte_order {
        ByteOrderType::LittleEndian => match size {
            1 => data.push(value as u8),
            2 => data.extend(&(value as u16).to_le_bytes()),
            4 => data.extend(&(value as u32).to_le_bytes()),
            8 => data.extend(&value.to_le_bytes()),
            _ => {}
        },
        ByteOrderType::BigEndian => match size {
            1 => data.push(value as u8),
            2 => data.extend(&(value as u16).to_be_bytes()),
            4 => data.extend(&(value as u32).to_be_bytes()),
            8 => data.extend(&value.to_be_bytes()),
            _ => {}
        },
    }
}

// =============================================================================
// Output Inspection
// =============================================================================

/// Dimensions of every IFD of a TIFF file, in file order.
pub fn tiff_page_dimensions(path: &Path) -> Vec<(u32, u32)> {
    let file = std::fs::File::open(path).unwrap();
    let mut decoder = tiff::decoder::Decoder::new(std::io::BufReader::new(file)).unwrap();
    let mut pages = vec![decoder.dimensions().unwrap()];
    while decoder.more_images() {
        decoder.next_image().unwrap();
        pages.push(decoder.dimensions().unwrap());
    }
    pages
}

/// First page of an RGB TIFF file.
pub fn read_tiff_rgb(path: &Path) -> RgbImage {
    let file = std::fs::File::open(path).unwrap();
    let mut decoder = tiff::decoder::Decoder::new(std::io::BufReader::new(file)).unwrap();
    let (width, height) = decoder.dimensions().unwrap();
    match decoder.read_image().unwrap() {
        tiff::decoder::DecodingResult::U8(raw) => RgbImage::from_raw(width, height, raw).unwrap(),
        _ => panic!("expected 8-bit samples"),
    }
}

/// Names of the files directly inside `dir`, sorted.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
