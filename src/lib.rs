//! # WSI Tissue Mask
//!
//! Tissue masking for multi-resolution Whole Slide Images (WSI).
//!
//! A tissue mask is computed once on a low-resolution level, mapped onto
//! every requested pyramid level, and used to whiten the background. The
//! masked levels are written as separate files or as one pyramid TIFF,
//! together with a JSON sidecar describing the run.
//!
//! ## Architecture
//!
//! - [`io`] - positioned reads over local files with block caching
//! - [`mod@format`] - TIFF/SVS parsing, JPEG tile repair and tile decoding
//! - [`slide`] - the [`SlideReader`] abstraction and the TIFF-backed slide
//! - [`mask`] - segmentation, refinement, level mapping and compositing
//! - [`output`] - level file encoding and the metadata sidecar
//! - [`pipeline`] - parameters and the per-slide entry points
//! - [`batch`] - directory-level driver
//! - [`config`] - CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use wsi_tissue_mask::{process_slide, ProcessingParams};
//!
//! #[tokio::main]
//! async fn main() {
//!     let params = ProcessingParams {
//!         levels: Some(vec![0, 2]),
//!         clean_mask: true,
//!         min_area: 50,
//!         ..Default::default()
//!     };
//!     let metadata = process_slide(Path::new("slide.svs"), Path::new("out/slide.tiff"), &params)
//!         .await
//!         .expect("processing failed");
//!     println!("{:?}", metadata.levels_processed);
//! }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod mask;
pub mod output;
pub mod pipeline;
pub mod slide;

// Re-export commonly used types
pub use batch::{run_batch, BatchConfig, BatchSummary};
pub use config::{Cli, Command};
pub use error::{BatchError, FormatError, IoError, MaskError, ProcessError, SlideError, TiffError};
pub use mask::{LevelOutput, SegmentationParams, Segmentation, TissueMask};
pub use output::{OutputCompression, OutputEncoder, ProcessingMetadata};
pub use pipeline::{process_opened_slide, process_slide, ProcessingParams};
pub use slide::{open_slide, Level, LocalSlide, Region, SlideReader, TiffSlide};
