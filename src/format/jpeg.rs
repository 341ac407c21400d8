//! JPEG tile stream repair.
//!
//! # Abbreviated streams
//!
//! TIFF writers (Aperio in particular) store the quantization (DQT) and
//! Huffman (DHT) tables once in the `JPEGTables` tag and leave them out of
//! every tile. Before a tile can be decoded the two are spliced together:
//! the tables without their EOI followed by the tile without its SOI.
//!
//! # RGB-coded tiles
//!
//! A three-component JPEG with no Adobe marker is assumed to be YCbCr. When
//! the TIFF says the tiles hold RGB directly, an Adobe APP14 segment with
//! transform 0 is inserted so decoders skip the colour conversion.

use bytes::{BufMut, Bytes, BytesMut};

// =============================================================================
// JPEG Markers
// =============================================================================

/// Start Of Image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

const DHT: u8 = 0xC4;
const DQT: u8 = 0xDB;
const SOS: u8 = 0xDA;
const APP14: u8 = 0xEE;

/// Adobe APP14 segment declaring untransformed (RGB) components
const ADOBE_RGB_SEGMENT: [u8; 16] = [
    0xFF, APP14, 0x00, 0x0E, b'A', b'd', b'o', b'b', b'e', 0x00, 0x64, 0x00, 0x00, 0x00, 0x00,
    0x00,
];

// =============================================================================
// Stream Analysis
// =============================================================================

/// Marker bytes of the header segments, in order, up to and including SOS.
fn header_markers(data: &[u8]) -> Vec<u8> {
    let mut markers = Vec::new();
    if data.len() < 4 || data[0..2] != SOI {
        return markers;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = data[pos + 1];
        // Fill bytes and standalone markers carry no length
        if marker == 0xFF || marker == 0x00 || (0xD0..=0xD9).contains(&marker) {
            pos += if marker == 0xFF { 1 } else { 2 };
            continue;
        }
        markers.push(marker);
        if marker == SOS || pos + 3 >= data.len() {
            break;
        }
        let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        pos += 2 + length;
    }
    markers
}

/// Whether the stream reaches its scan without defining any tables.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    let markers = header_markers(data);
    markers.last() == Some(&SOS) && !markers.iter().any(|&m| m == DQT || m == DHT)
}

/// Whether the stream defines quantization tables itself.
pub fn is_complete_stream(data: &[u8]) -> bool {
    header_markers(data).contains(&DQT)
}

/// Whether the stream already carries an Adobe APP14 segment.
pub fn has_adobe_marker(data: &[u8]) -> bool {
    header_markers(data).contains(&APP14)
}

// =============================================================================
// Stream Rewriting
// =============================================================================

/// Splice shared tables in front of an abbreviated tile stream.
pub fn merge_jpeg_tables(tables: &[u8], tile_data: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(tile_data);
    }
    if tile_data.is_empty() {
        return Bytes::new();
    }

    let tables = tables.strip_suffix(&EOI).unwrap_or(tables);
    let tile = tile_data.strip_prefix(&SOI).unwrap_or(tile_data);

    let mut merged = BytesMut::with_capacity(tables.len() + tile.len());
    merged.put_slice(tables);
    merged.put_slice(tile);
    merged.freeze()
}

/// Insert an Adobe "no transform" segment right after SOI.
pub fn with_adobe_rgb_marker(data: &[u8]) -> Bytes {
    if data.len() < 2 || data[0..2] != SOI || has_adobe_marker(data) {
        return Bytes::copy_from_slice(data);
    }
    let mut out = BytesMut::with_capacity(data.len() + ADOBE_RGB_SEGMENT.len());
    out.put_slice(&SOI);
    out.put_slice(&ADOBE_RGB_SEGMENT);
    out.put_slice(&data[2..]);
    out.freeze()
}

/// Turn a raw tile payload into a stream a baseline decoder accepts.
///
/// Merges `tables` when the tile is abbreviated, and marks the stream as
/// RGB when `rgb_components` is set.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile_data: &[u8], rgb_components: bool) -> Bytes {
    let stream = match tables {
        Some(tables) if !is_complete_stream(tile_data) && is_abbreviated_stream(tile_data) => {
            merge_jpeg_tables(tables, tile_data)
        }
        _ => Bytes::copy_from_slice(tile_data),
    };

    if rgb_components {
        with_adobe_rgb_marker(&stream)
    } else {
        stream
    }
}

// =============================================================================
// Tests
// =============================================================================
