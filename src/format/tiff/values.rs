//! Reading IFD entry values.
//!
//! Small values live inside the entry itself; anything larger sits at the
//! offset the entry points to and is fetched with a single read, so the
//! offset/byte-count tables of a level cost one request each.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::FieldType;

// =============================================================================
// ValueReader
// =============================================================================

/// Reads tag values respecting the file's byte order and TIFF flavour.
pub struct ValueReader<'a, R: RangeReader> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Raw value bytes of an entry, inline or fetched from its offset.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            return Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ));
        }

        let offset = entry.value_offset(self.header.byte_order);
        Ok(self.reader.read_exact_at(offset, size as usize).await?)
    }

    /// Integer array widened to u64 (TileOffsets, TileByteCounts).
    pub async fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = integer_type(entry)?;
        if entry.count == 0 {
            return Ok(Vec::new());
        }
        let bytes = self.read_bytes(entry).await?;
        Ok(parse_u64_array(
            &bytes,
            entry.count as usize,
            field_type,
            self.header.byte_order,
        ))
    }

    /// Integer array narrowed to u32 (BitsPerSample).
    pub async fn read_u32_array(&self, entry: &IfdEntry) -> Result<Vec<u32>, TiffError> {
        let values = self.read_u64_array(entry).await?;
        values
            .into_iter()
            .map(|v| {
                u32::try_from(v).map_err(|_| TiffError::InvalidTagValue {
                    tag: "u32 array",
                    message: format!("value {} does not fit in 32 bits", v),
                })
            })
            .collect()
    }

    /// ASCII value with the trailing NUL stripped.
    pub async fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        if entry.field_type != Some(FieldType::Ascii) {
            return Err(TiffError::InvalidTagValue {
                tag: "ASCII",
                message: format!("expected Ascii field type, got {}", entry.field_type_raw),
            });
        }
        let bytes = self.read_bytes(entry).await?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Opaque bytes (JPEGTables).
    pub async fn read_raw_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        self.read_bytes(entry).await
    }
}

fn integer_type(entry: &IfdEntry) -> Result<FieldType, TiffError> {
    match entry.field_type {
        Some(ft @ (FieldType::Byte | FieldType::Short | FieldType::Long | FieldType::Long8)) => {
            Ok(ft)
        }
        Some(other) => Err(TiffError::InvalidTagValue {
            tag: "integer array",
            message: format!("expected an integer field type, got {:?}", other),
        }),
        None => Err(TiffError::UnknownFieldType(entry.field_type_raw)),
    }
}

// =============================================================================
// Byte-slice decoding
// =============================================================================

/// Decode up to `count` integers of `field_type` from `bytes`.
///
/// Stops early if `bytes` is short; non-integer types yield an empty vector.
pub fn parse_u64_array(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Vec<u64> {
    let width = field_type.size_in_bytes();
    let read: fn(ByteOrder, &[u8]) -> u64 = match field_type {
        FieldType::Byte => |_, b| b[0] as u64,
        FieldType::Short => |o, b| o.read_u16(b) as u64,
        FieldType::Long => |o, b| o.read_u32(b) as u64,
        FieldType::Long8 => |o, b| o.read_u64(b),
        _ => return Vec::new(),
    };

    bytes
        .chunks_exact(width)
        .take(count)
        .map(|chunk| read(byte_order, chunk))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
