//! JSON sidecar describing one processed slide.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::MaskError;

use super::{write_via_partial, OutputCompression};

/// Source slide facts recorded in the sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideSummary {
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub level_count: usize,
    pub mpp: Option<f64>,
    pub magnification: Option<f64>,
}

/// One produced level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelRecord {
    pub level: usize,
    pub width: u32,
    pub height: u32,
    pub downsample: f64,
    pub tissue_fraction: f64,
    pub output_path: String,
}

/// Everything about one slide's processing, built once and written as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub source_path: String,
    pub detection_level: usize,
    pub threshold_used: u8,
    pub multiplier: f64,
    pub sigma: f64,
    pub clean_mask: bool,
    pub min_area: u64,
    pub levels_processed: Vec<usize>,
    pub pyramid: bool,
    pub compression: OutputCompression,
    pub output_paths: Vec<String>,

    /// Explicit threshold; null when Otsu's method chose it
    pub threshold_requested: Option<i64>,
    pub max_level: Option<usize>,
    pub requested_levels: Option<Vec<usize>>,
    pub mask_path: Option<String>,
    pub detection_dimensions: [u32; 2],
    pub detection_tissue_fraction: f64,
    pub slide: SlideSummary,
    pub levels: Vec<LevelRecord>,
}

/// Serialize `metadata` as pretty JSON to `path`.
pub fn write_metadata(path: &Path, metadata: &ProcessingMetadata) -> Result<(), MaskError> {
    let json = serde_json::to_vec_pretty(metadata).map_err(|e| MaskError::write_failure(path, e))?;
    write_via_partial(path, |partial| std::fs::write(partial, &json))?;
    info!(path = %path.display(), "Wrote metadata");
    Ok(())
}
