//! Batch processing of a directory of slides.
//!
//! A JSON config names the input and output directories plus the same
//! processing parameters the `process` command takes:
//!
//! ```json
//! {
//!   "input_dir": "slides/",
//!   "output_dir": "masked/",
//!   "output_format": "tiff",
//!   "clean_mask": true,
//!   "levels": "0,2"
//! }
//! ```
//!
//! Slides are processed one after another. A failing slide is logged and
//! counted, and the batch moves on to the next one.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{BatchError, ProcessError};
use crate::output::OutputFileType;
use crate::pipeline::{output_path_for, process_slide, ProcessingParams};

/// File extensions recognised as slides.
pub const SLIDE_EXTENSIONS: &[&str] = &["svs", "tif", "tiff"];

pub const DEFAULT_OUTPUT_FORMAT: &str = "png";

fn default_output_format() -> String {
    DEFAULT_OUTPUT_FORMAT.to_string()
}

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,

    /// Extension of every per-slide output (`png`, `tif` or `tiff`)
    #[serde(default = "default_output_format")]
    pub output_format: String,

    #[serde(flatten)]
    pub params: ProcessingParams,
}

impl BatchConfig {
    pub fn from_json(text: &str, source: &Path) -> Result<Self, BatchError> {
        serde_json::from_str(text).map_err(|e| BatchError::ConfigParse {
            path: source.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, BatchError> {
        let text = std::fs::read_to_string(path).map_err(|e| BatchError::ConfigRead {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&text, path)
    }

    /// Check the parameters and the output format.
    pub fn validate(&self) -> Result<(), BatchError> {
        self.params
            .validate()
            .map_err(|e| BatchError::Invalid(e.to_string()))?;

        let probe = PathBuf::from(format!("slide.{}", self.output_format.trim_start_matches('.')));
        if !self.params.pyramid && OutputFileType::from_path(&probe).is_none() {
            return Err(BatchError::Invalid(format!(
                "output_format '{}' is not one of png, tif, tiff",
                self.output_format
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Discovery
// =============================================================================

fn is_slide(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SLIDE_EXTENSIONS.iter().any(|s| e.eq_ignore_ascii_case(s)))
        .unwrap_or(false)
}

/// Slide files directly inside `dir`, sorted by path.
pub fn discover_slides(dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    let dir_error = |reason: String| BatchError::Directory {
        path: dir.display().to_string(),
        reason,
    };
    if !dir.is_dir() {
        return Err(dir_error("not a directory".to_string()));
    }

    let mut slides = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| dir_error(e.to_string()))? {
        let path = entry.map_err(|e| dir_error(e.to_string()))?.path();
        if path.is_file() && is_slide(&path) {
            slides.push(path);
        }
    }
    slides.sort();
    Ok(slides)
}

// =============================================================================
// Overwrite Confirmation
// =============================================================================

/// Whether `dir` exists and holds at least one entry.
pub fn has_content(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Decide whether processing may write into `dir`.
///
/// Missing or empty directories are always fine. Otherwise `force` allows
/// it, or the user is asked on `output`/`input` until they answer yes or
/// no. End of input counts as no.
pub fn confirm_overwrite<I: BufRead, O: Write>(
    dir: &Path,
    force: bool,
    mut input: I,
    mut output: O,
) -> std::io::Result<bool> {
    if !has_content(dir) {
        return Ok(true);
    }
    if force {
        warn!(dir = %dir.display(), "Output directory has content, overwriting (--force)");
        return Ok(true);
    }

    loop {
        write!(
            output,
            "Output directory {} exists and has content. Overwrite? [y/N]: ",
            dir.display()
        )?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(false);
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "" | "n" | "no" => return Ok(false),
            _ => writeln!(output, "Please enter 'y' or 'n'")?,
        }
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub processed: Vec<PathBuf>,
    pub failed: Vec<ProcessError>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.processed.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Process every slide of `config.input_dir` into `config.output_dir`.
///
/// Overwrite confirmation is the caller's job; this only creates the
/// output directory and runs the slides.
pub async fn run_batch(config: &BatchConfig) -> Result<BatchSummary, BatchError> {
    config.validate()?;
    let slides = discover_slides(&config.input_dir)?;
    if slides.is_empty() {
        warn!(dir = %config.input_dir.display(), "No slides found");
        return Ok(BatchSummary::default());
    }

    std::fs::create_dir_all(&config.output_dir).map_err(|e| BatchError::Directory {
        path: config.output_dir.display().to_string(),
        reason: e.to_string(),
    })?;
    info!(
        count = slides.len(),
        input_dir = %config.input_dir.display(),
        output_dir = %config.output_dir.display(),
        "Starting batch"
    );

    let mut summary = BatchSummary::default();
    for (index, slide) in slides.iter().enumerate() {
        let output = output_path_for(slide, &config.output_dir, &config.output_format);
        info!(
            slide = %slide.display(),
            "Processing file {}/{}",
            index + 1,
            slides.len()
        );

        match process_slide(slide, &output, &config.params).await {
            Ok(metadata) => {
                info!(
                    slide = %slide.display(),
                    levels = ?metadata.levels_processed,
                    "Slide done"
                );
                summary.processed.push(slide.clone());
            }
            Err(e) => {
                error!(error = %e, "Slide failed");
                summary.failed.push(e);
            }
        }
    }

    info!(
        processed = summary.processed.len(),
        failed = summary.failed.len(),
        "Batch complete"
    );
    Ok(summary)
}
