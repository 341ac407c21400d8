//! TIFF parsing for pyramidal slides.
//!
//! - **Byte order**: declared by the header (II = little-endian, MM = big-endian).
//! - **Classic TIFF vs BigTIFF**: 32-bit vs 64-bit offsets, handled transparently.
//! - **IFDs**: one per stored image; a slide has one per pyramid level plus
//!   extras (thumbnail, label, macro).
//! - **Inline vs offset values**: values that fit in the entry's value field
//!   are stored there; larger ones live at the offset it holds.

mod parser;
mod pyramid;
mod tags;
mod validation;
mod values;

pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use pyramid::{PyramidLevel, TiffPyramid, TileData};
pub use tags::{Compression, FieldType, Photometric, TiffTag};
pub use validation::{validate_level, validate_pyramid};
pub use values::{parse_u64_array, ValueReader};
