//! Command-line configuration for the tissue masker.
//!
//! Two subcommands share the same processing flags:
//!
//! - `process`: mask one slide
//! - `batch`: mask every slide of a directory, configured by a JSON file
//!
//! # Example
//!
//! ```text
//! wsi-tissue-mask process --input slide.svs --output out/slide.tiff \
//!     --levels 0,2 --clean-mask --min-area 50
//! wsi-tissue-mask batch --config config.json --force
//! ```
//!
//! # Environment Variables
//!
//! - `WSI_MASK_COMPRESSION` - TIFF compression (default: lzw)
//! - `WSI_MASK_MAX_DETECTION_DIMENSION` - detection level size cap (default: 4096)
//! - `WSI_MASK_VERBOSE` - debug logging

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::mask::refine::DEFAULT_MIN_AREA;
use crate::mask::segment::{DEFAULT_MULTIPLIER, DEFAULT_SIGMA};
use crate::output::OutputCompression;
use crate::pipeline::{ProcessingParams, DEFAULT_MAX_DETECTION_DIMENSION};

/// Default batch configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tissue masking for multi-resolution whole slide images.
///
/// Detects tissue on a low-resolution level, whitens the background on
/// every requested level and writes the result as separate files or a
/// pyramid TIFF, with a JSON metadata sidecar.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-tissue-mask")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false, env = "WSI_MASK_VERBOSE")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Mask a single slide.
    Process(ProcessArgs),

    /// Mask every slide in a directory using a JSON config.
    Batch(BatchArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    /// Slide to read (.svs, .tif, .tiff).
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output path; level 0 is written here, other levels next to it.
    #[arg(short, long)]
    pub output: PathBuf,

    // =========================================================================
    // Segmentation
    // =========================================================================
    /// Fixed threshold (0-255). Omit to use Otsu's method.
    #[arg(short, long, allow_negative_numbers = true)]
    pub threshold: Option<i64>,

    /// Multiplier applied to Otsu's threshold.
    #[arg(short, long, default_value_t = DEFAULT_MULTIPLIER)]
    pub multiplier: f64,

    /// Gaussian blur sigma; 0 disables blurring.
    #[arg(short, long, default_value_t = DEFAULT_SIGMA)]
    pub sigma: f64,

    /// Remove small artifacts and fill holes in the mask.
    #[arg(short, long, default_value_t = false)]
    pub clean_mask: bool,

    /// Smallest tissue component kept by --clean-mask, in pixels.
    #[arg(long, default_value_t = DEFAULT_MIN_AREA)]
    pub min_area: u64,

    /// Force the level tissue is detected on.
    #[arg(long)]
    pub detection_level: Option<usize>,

    /// Detect on the first level whose sides both fit within this size.
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_DETECTION_DIMENSION,
        env = "WSI_MASK_MAX_DETECTION_DIMENSION"
    )]
    pub max_detection_dimension: u32,

    // =========================================================================
    // Output
    // =========================================================================
    /// Also save the mask as {stem}_mask.png.
    #[arg(long, default_value_t = false)]
    pub save_mask: bool,

    /// Write one pyramid TIFF instead of one file per level.
    #[arg(short, long, default_value_t = false)]
    pub pyramid: bool,

    /// Lossless TIFF compression.
    #[arg(long, value_enum, default_value_t = OutputCompression::Lzw, env = "WSI_MASK_COMPRESSION")]
    pub compression: OutputCompression,

    /// Highest level to process (0 is full resolution).
    #[arg(long)]
    pub max_level: Option<usize>,

    /// Comma-separated levels to process; overrides --max-level.
    #[arg(short, long, value_delimiter = ',')]
    pub levels: Option<Vec<usize>>,
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Batch configuration JSON.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Overwrite a non-empty output directory without asking.
    #[arg(short, long, default_value_t = false)]
    pub force: bool,
}

impl ProcessArgs {
    /// Validate the arguments and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.params().validate().map_err(|e| e.to_string())
    }

    /// The parameter bundle handed to the pipeline.
    pub fn params(&self) -> ProcessingParams {
        ProcessingParams {
            threshold: self.threshold,
            multiplier: self.multiplier,
            sigma: self.sigma,
            clean_mask: self.clean_mask,
            min_area: self.min_area,
            save_mask: self.save_mask,
            pyramid: self.pyramid,
            compression: self.compression,
            max_level: self.max_level,
            levels: self.levels.clone(),
            detection_level: self.detection_level,
            max_detection_dimension: self.max_detection_dimension,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
