//! Per-slide processing.
//!
//! [`process_slide`] runs the whole pipeline for one slide:
//!
//! 1. validate parameters (no I/O yet)
//! 2. open the slide and resolve the levels to produce (no decoding yet)
//! 3. segment the detection level, optionally refine, optionally save the mask
//! 4. for each level: decode, map the mask, composite, encode
//! 5. write the metadata sidecar
//!
//! Only one level raster is held at a time.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::error::{MaskError, ProcessError};
use crate::mask::refine::DEFAULT_MIN_AREA;
use crate::mask::segment::{DEFAULT_MULTIPLIER, DEFAULT_SIGMA};
use crate::mask::{composite, map_to_level, refine, segment, SegmentationParams};
use crate::output::{
    write_metadata, LevelRecord, OutputCompression, OutputEncoder, ProcessingMetadata,
    SlideSummary,
};
use crate::slide::{open_slide, SlideReader};

/// Largest width/height a level may have to be picked for detection.
pub const DEFAULT_MAX_DETECTION_DIMENSION: u32 = 4096;

// =============================================================================
// Parameters
// =============================================================================

/// Immutable parameter bundle for processing one slide.
///
/// Field names match the CLI flags and the batch JSON keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingParams {
    /// Explicit threshold (0-255); `None` selects Otsu's method
    pub threshold: Option<i64>,
    pub multiplier: f64,
    pub sigma: f64,
    pub clean_mask: bool,
    pub min_area: u64,
    pub save_mask: bool,
    pub pyramid: bool,
    pub compression: OutputCompression,

    /// Highest level index to produce, ignored when `levels` is set
    pub max_level: Option<usize>,

    /// Exact levels to produce
    #[serde(deserialize_with = "deserialize_levels")]
    pub levels: Option<Vec<usize>>,

    /// Forced detection level
    pub detection_level: Option<usize>,
    pub max_detection_dimension: u32,
}

impl Default for ProcessingParams {
    fn default() -> Self {
        Self {
            threshold: None,
            multiplier: DEFAULT_MULTIPLIER,
            sigma: DEFAULT_SIGMA,
            clean_mask: false,
            min_area: DEFAULT_MIN_AREA,
            save_mask: false,
            pyramid: false,
            compression: OutputCompression::default(),
            max_level: None,
            levels: None,
            detection_level: None,
            max_detection_dimension: DEFAULT_MAX_DETECTION_DIMENSION,
        }
    }
}

impl ProcessingParams {
    pub fn segmentation(&self) -> SegmentationParams {
        SegmentationParams {
            threshold: self.threshold,
            multiplier: self.multiplier,
            sigma: self.sigma,
        }
    }

    /// Check everything that can be checked without opening the slide.
    pub fn validate(&self) -> Result<(), MaskError> {
        self.segmentation().validate()?;

        if matches!(&self.levels, Some(levels) if levels.is_empty()) {
            return Err(MaskError::InvalidParameter {
                name: "levels",
                message: "empty level list".to_string(),
            });
        }
        if self.max_detection_dimension == 0 {
            return Err(MaskError::InvalidParameter {
                name: "max_detection_dimension",
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Levels to produce on a slide with `level_count` levels, ascending.
    ///
    /// An explicit list wins over `max_level`; with neither, every level is
    /// produced. Any index outside the slide is `LevelOutOfRange`.
    pub fn select_levels(&self, level_count: usize) -> Result<Vec<usize>, MaskError> {
        if level_count == 0 {
            return Err(MaskError::UnreadableSlide {
                reason: "slide has no levels".to_string(),
            });
        }
        let out_of_range = |level| MaskError::LevelOutOfRange { level, level_count };

        if let Some(levels) = &self.levels {
            if let Some(&bad) = levels.iter().find(|&&l| l >= level_count) {
                return Err(out_of_range(bad));
            }
            let mut selected = levels.clone();
            selected.sort_unstable();
            selected.dedup();
            return Ok(selected);
        }

        match self.max_level {
            Some(max) if max >= level_count => Err(out_of_range(max)),
            Some(max) => Ok((0..=max).collect()),
            None => Ok((0..level_count).collect()),
        }
    }

    /// Level the tissue mask is computed at.
    pub fn choose_detection_level<S: SlideReader + ?Sized>(
        &self,
        slide: &S,
    ) -> Result<usize, MaskError> {
        match self.detection_level {
            Some(level) if level >= slide.level_count() => Err(MaskError::LevelOutOfRange {
                level,
                level_count: slide.level_count(),
            }),
            Some(level) => Ok(level),
            None => Ok(slide.level_for_max_dimension(self.max_detection_dimension)),
        }
    }
}

/// Parse "0, 2,3" into level indices.
pub fn parse_level_list(text: &str) -> Result<Vec<usize>, String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| format!("invalid level '{s}' in '{text}': expected comma-separated integers"))
        })
        .collect()
}

/// `levels` may be given as `[0, 2]` or as `"0,2"`.
fn deserialize_levels<'de, D>(deserializer: D) -> Result<Option<Vec<usize>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Levels {
        List(Vec<usize>),
        Text(String),
    }

    match Option::<Levels>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Levels::List(levels)) => Ok(Some(levels)),
        Some(Levels::Text(text)) => parse_level_list(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

// =============================================================================
// Processing
// =============================================================================

/// Process the slide at `input`, writing outputs next to `output`.
pub async fn process_slide(
    input: &Path,
    output: &Path,
    params: &ProcessingParams,
) -> Result<ProcessingMetadata, ProcessError> {
    let fail = |source: MaskError| ProcessError::new(input.display().to_string(), source);

    // Parameter errors are reported before the slide is touched
    params.validate().map_err(fail)?;
    OutputEncoder::resolve_output_path(output, params.pyramid).map_err(fail)?;

    let slide = open_slide(input)
        .await
        .map_err(|e| fail(MaskError::from(e)))?;
    process_opened_slide(&slide, output, params)
        .await
        .map_err(fail)
}

/// Run the pipeline on an already opened slide.
pub async fn process_opened_slide<S: SlideReader + ?Sized>(
    slide: &S,
    output: &Path,
    params: &ProcessingParams,
) -> Result<ProcessingMetadata, MaskError> {
    params.validate()?;
    let mut encoder = OutputEncoder::new(output, params.pyramid, params.compression)?;

    let levels = params.select_levels(slide.level_count())?;
    let detection_level = params.choose_detection_level(slide)?;
    info!(
        source = slide.source(),
        levels = ?levels,
        detection_level,
        "Processing slide"
    );

    if let Some(parent) = encoder.output_path().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| MaskError::write_failure(parent, e))?;
        }
    }

    // Detection
    let detection_raster = slide.read_level(detection_level, None).await?;
    let detection_dimensions = detection_raster.dimensions();
    let segmentation = segment(&detection_raster, detection_level, &params.segmentation())?;
    drop(detection_raster);
    info!(
        threshold = segmentation.threshold,
        otsu = ?segmentation.otsu_level,
        tissue_fraction = segmentation.mask.tissue_fraction(),
        "Segmented detection level"
    );

    let mask = if params.clean_mask {
        let refined = refine(&segmentation.mask, params.min_area);
        debug!(
            before = segmentation.mask.tissue_pixels(),
            after = refined.tissue_pixels(),
            "Refined mask"
        );
        refined
    } else {
        segmentation.mask.clone()
    };

    let mask_path = if params.save_mask {
        Some(encoder.save_mask(&mask)?)
    } else {
        None
    };

    // Level outputs
    let estimated_bytes = levels
        .iter()
        .filter_map(|&l| slide.levels().get(l))
        .map(|l| l.pixel_count() * 3)
        .sum();
    encoder = encoder.with_estimated_size(estimated_bytes);
    let metadata_path = encoder.metadata_path();

    let mut records = Vec::with_capacity(levels.len());
    for &level in &levels {
        let geometry = slide.level(level)?;
        let raster = slide.read_level(level, None).await?;
        let level_mask = map_to_level(&mask, slide.levels(), level)?;
        let composited = composite(raster, &level_mask)?;
        let path = encoder.write_level(&composited)?;

        info!(
            level,
            width = geometry.width,
            height = geometry.height,
            tissue_fraction = composited.tissue_fraction,
            "Processed level"
        );
        records.push(LevelRecord {
            level,
            width: geometry.width,
            height: geometry.height,
            downsample: geometry.downsample,
            tissue_fraction: composited.tissue_fraction,
            output_path: path.display().to_string(),
        });
    }
    let output_paths = encoder.finish()?;

    let (width, height) = slide.dimensions().unwrap_or((0, 0));
    let metadata = ProcessingMetadata {
        source_path: slide.source().to_string(),
        detection_level,
        threshold_used: segmentation.threshold,
        multiplier: params.multiplier,
        sigma: params.sigma,
        clean_mask: params.clean_mask,
        min_area: params.min_area,
        levels_processed: levels,
        pyramid: params.pyramid,
        compression: params.compression,
        output_paths: output_paths.iter().map(|p| display(p)).collect(),
        threshold_requested: params.threshold,
        max_level: params.max_level,
        requested_levels: params.levels.clone(),
        mask_path: mask_path.as_deref().map(display),
        detection_dimensions: [detection_dimensions.0, detection_dimensions.1],
        detection_tissue_fraction: mask.tissue_fraction(),
        slide: SlideSummary {
            format: slide.format_name().to_string(),
            width,
            height,
            level_count: slide.level_count(),
            mpp: slide.mpp(),
            magnification: slide.magnification(),
        },
        levels: records,
    };
    write_metadata(&metadata_path, &metadata)?;

    Ok(metadata)
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Output path for `slide` inside `output_dir` with extension `format`.
pub fn output_path_for(slide: &Path, output_dir: &Path, format: &str) -> PathBuf {
    let stem = slide
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "slide".to_string());
    output_dir.join(format!("{stem}.{}", format.trim_start_matches('.')))
}
