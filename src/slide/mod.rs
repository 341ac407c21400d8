//! Slide abstraction layer.
//!
//! The masking pipeline reads slides through the [`SlideReader`] trait and
//! never touches TIFF structures directly:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Masking pipeline             │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           SlideReader Trait             │
//! │  (levels, metadata, region decoding)    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              TiffSlide                  │
//! │   (Aperio SVS / generic pyramidal TIFF) │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     BlockCache<FileRangeReader>         │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use wsi_tissue_mask::slide::{open_slide, SlideReader};
//!
//! let slide = open_slide("slide.svs").await?;
//! let thumbnail = slide.read_level(slide.level_count() - 1, None).await?;
//! ```

mod reader;
mod tiff_slide;

use std::path::Path;

use tracing::info;

use crate::error::{FormatError, SlideError};
use crate::io::{BlockCache, FileRangeReader};

pub use reader::{check_region, Level, Region, SlideReader};
pub use tiff_slide::TiffSlide;

/// A slide opened from the local filesystem.
pub type LocalSlide = TiffSlide<BlockCache<FileRangeReader>>;

/// Open a slide file from disk.
pub async fn open_slide(path: impl AsRef<Path>) -> Result<LocalSlide, SlideError> {
    let path = path.as_ref();
    let file = FileRangeReader::open(path)
        .await
        .map_err(FormatError::from)?;
    let slide = TiffSlide::open(BlockCache::new(file)).await?;

    info!(
        path = %path.display(),
        format = slide.format_name(),
        levels = slide.level_count(),
        mpp = ?slide.mpp(),
        "Opened slide"
    );
    Ok(slide)
}
