//! Slide file formats.
//!
//! Pyramidal TIFF is the container behind both supported formats:
//!
//! - **Aperio SVS**: identified by "Aperio" in the first ImageDescription
//! - **Generic Pyramidal TIFF**: any other tiled TIFF/BigTIFF pyramid
//!
//! [`tiff`] parses structure, [`codec`] turns stored tiles into RGB.

pub mod codec;
pub mod detect;
pub mod jpeg;
pub mod svs;
pub mod tiff;

pub use codec::{blank_tile, decode_tile, TileLayout};
pub use detect::{detect_format, ensure_tiff, is_tiff_header, SlideFormat};
pub use svs::SvsMetadata;
