//! Level output files.
//!
//! # Independent mode
//!
//! One file per level. Level 0 goes to the output path itself, level `N`
//! to `{stem}_level{N}{ext}` next to it. `.tif`/`.tiff` outputs are TIFF
//! with the chosen compression, `.png` outputs are PNG.
//!
//! # Pyramid mode
//!
//! A single TIFF holding every processed level as its own IFD, highest
//! resolution first. Reduced-resolution IFDs carry `NewSubfileType = 1`.
//! The output always gets a `.tiff`/`.tif` extension.
//!
//! Outputs whose raw pixel data exceeds [`BIGTIFF_THRESHOLD`] are written
//! as BigTIFF, since classic TIFF offsets stop at 4 GiB.

use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage};
use tiff::encoder::{colortype, TiffEncoder, TiffKind, TiffKindBig, TiffKindStandard};
use tiff::tags::Tag;
use tiff::TiffResult;
use tracing::{debug, info};

use crate::error::MaskError;
use crate::mask::{LevelOutput, TissueMask};

use super::{commit_partial, partial_path, write_via_partial, OutputCompression};

/// Raw pixel bytes above which TIFF output switches to BigTIFF.
pub const BIGTIFF_THRESHOLD: u64 = 1 << 31;

/// Container used for independent level files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFileType {
    Tiff,
    Png,
}

impl OutputFileType {
    /// File type implied by the extension of `path`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "tif" | "tiff" => Some(OutputFileType::Tiff),
            "png" => Some(OutputFileType::Png),
            _ => None,
        }
    }
}

// =============================================================================
// TIFF Writing
// =============================================================================

/// A TIFF encoder of either flavour, writing straight to a file.
enum TiffSink {
    Standard(TiffEncoder<File, TiffKindStandard>),
    Big(TiffEncoder<File, TiffKindBig>),
}

impl TiffSink {
    fn create(path: &Path, compression: OutputCompression, big: bool) -> TiffResult<Self> {
        let file = File::create(path)?;
        Ok(if big {
            TiffSink::Big(TiffEncoder::new_big(file)?.with_compression(compression.to_tiff()))
        } else {
            TiffSink::Standard(TiffEncoder::new(file)?.with_compression(compression.to_tiff()))
        })
    }

    fn write_rgb(&mut self, raster: &RgbImage, reduced: bool) -> TiffResult<()> {
        match self {
            TiffSink::Standard(encoder) => write_rgb_ifd(encoder, raster, reduced),
            TiffSink::Big(encoder) => write_rgb_ifd(encoder, raster, reduced),
        }
    }
}

fn write_rgb_ifd<W: Write + Seek, K: TiffKind>(
    encoder: &mut TiffEncoder<W, K>,
    raster: &RgbImage,
    reduced: bool,
) -> TiffResult<()> {
    let mut image = encoder.new_image::<colortype::RGB8>(raster.width(), raster.height())?;
    if reduced {
        image.encoder().write_tag(Tag::NewSubfileType, 1u32)?;
    }
    image.write_data(raster.as_raw())
}

fn raw_size(raster: &RgbImage) -> u64 {
    raster.width() as u64 * raster.height() as u64 * 3
}

// =============================================================================
// OutputEncoder
// =============================================================================

/// In-progress pyramid file.
struct PyramidFile {
    sink: TiffSink,
    partial: PathBuf,
    ifds: usize,
}

/// Serializes composited levels.
///
/// Call [`OutputEncoder::write_level`] for each level in ascending index
/// order, then [`OutputEncoder::finish`]. Dropping an unfinished encoder
/// removes its partial pyramid file.
pub struct OutputEncoder {
    output: PathBuf,
    pyramid: bool,
    compression: OutputCompression,
    file_type: OutputFileType,
    estimated_bytes: u64,
    pyramid_file: Option<PyramidFile>,
    written: Vec<PathBuf>,
}

impl OutputEncoder {
    /// Final output path for a requested one.
    ///
    /// Pyramid outputs are forced to a TIFF extension. Independent outputs
    /// must name a TIFF or PNG file.
    pub fn resolve_output_path(output: &Path, pyramid: bool) -> Result<PathBuf, MaskError> {
        if output.file_stem().is_none() {
            return Err(MaskError::InvalidParameter {
                name: "output",
                message: format!("{} has no file name", output.display()),
            });
        }
        if pyramid {
            return Ok(match OutputFileType::from_path(output) {
                Some(OutputFileType::Tiff) => output.to_path_buf(),
                _ => output.with_extension("tiff"),
            });
        }
        match OutputFileType::from_path(output) {
            Some(_) => Ok(output.to_path_buf()),
            None => Err(MaskError::InvalidParameter {
                name: "output",
                message: format!(
                    "{}: expected a .tif, .tiff or .png extension",
                    output.display()
                ),
            }),
        }
    }

    pub fn new(
        output: &Path,
        pyramid: bool,
        compression: OutputCompression,
    ) -> Result<Self, MaskError> {
        let output = Self::resolve_output_path(output, pyramid)?;
        let file_type = if pyramid {
            OutputFileType::Tiff
        } else {
            OutputFileType::from_path(&output).unwrap_or(OutputFileType::Tiff)
        };
        Ok(Self {
            output,
            pyramid,
            compression,
            file_type,
            estimated_bytes: 0,
            pyramid_file: None,
            written: Vec::new(),
        })
    }

    /// Expected raw size of the whole pyramid, used to pick BigTIFF.
    pub fn with_estimated_size(mut self, bytes: u64) -> Self {
        self.estimated_bytes = bytes;
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    fn sibling(&self, suffix: &str, extension: &str) -> PathBuf {
        let stem = self
            .output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.output.with_file_name(format!("{stem}{suffix}{extension}"))
    }

    /// File a level is written to. In pyramid mode every level shares the
    /// output path.
    pub fn level_path(&self, level: usize) -> PathBuf {
        if self.pyramid || level == 0 {
            return self.output.clone();
        }
        let extension = self
            .output
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        self.sibling(&format!("_level{level}"), &extension)
    }

    pub fn mask_path(&self) -> PathBuf {
        self.sibling("_mask", ".png")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.sibling("_metadata", ".json")
    }

    /// Write one composited level and return the file it landed in.
    pub fn write_level(&mut self, level: &LevelOutput) -> Result<PathBuf, MaskError> {
        let path = self.level_path(level.level);
        if self.pyramid {
            self.append_to_pyramid(level)?;
        } else {
            self.write_independent(&path, level)?;
            self.written.push(path.clone());
        }

        debug!(
            level = level.level,
            width = level.raster.width(),
            height = level.raster.height(),
            path = %path.display(),
            "Wrote level"
        );
        Ok(path)
    }

    fn write_independent(&self, path: &Path, level: &LevelOutput) -> Result<(), MaskError> {
        match self.file_type {
            OutputFileType::Png => write_via_partial(path, |partial| {
                level.raster.save_with_format(partial, ImageFormat::Png)
            }),
            OutputFileType::Tiff => {
                let big = raw_size(&level.raster) > BIGTIFF_THRESHOLD;
                write_via_partial(path, |partial| {
                    TiffSink::create(partial, self.compression, big)?
                        .write_rgb(&level.raster, false)
                })
            }
        }
    }

    fn append_to_pyramid(&mut self, level: &LevelOutput) -> Result<(), MaskError> {
        if self.pyramid_file.is_none() {
            let partial = partial_path(&self.output);
            let big = self.estimated_bytes.max(raw_size(&level.raster)) > BIGTIFF_THRESHOLD;
            let sink = TiffSink::create(&partial, self.compression, big).map_err(|e| {
                let _ = std::fs::remove_file(&partial);
                MaskError::write_failure(&self.output, e)
            })?;
            if big {
                debug!(path = %self.output.display(), "Writing pyramid as BigTIFF");
            }
            self.pyramid_file = Some(PyramidFile {
                sink,
                partial,
                ifds: 0,
            });
        }

        let output = self.output.clone();
        if let Some(file) = self.pyramid_file.as_mut() {
            let reduced = file.ifds > 0;
            file.sink
                .write_rgb(&level.raster, reduced)
                .map_err(|e| MaskError::write_failure(&output, e))?;
            file.ifds += 1;
        }
        Ok(())
    }

    /// Write the mask snapshot: tissue black, background white.
    pub fn save_mask(&self, mask: &TissueMask) -> Result<PathBuf, MaskError> {
        let path = self.mask_path();
        let snapshot = mask.to_snapshot();
        write_via_partial(&path, |partial| {
            snapshot.save_with_format(partial, ImageFormat::Png)
        })?;
        info!(path = %path.display(), level = mask.level(), "Saved tissue mask");
        Ok(path)
    }

    /// Close the pyramid file, if any, and return every path written.
    pub fn finish(mut self) -> Result<Vec<PathBuf>, MaskError> {
        if let Some(file) = self.pyramid_file.take() {
            let PyramidFile { sink, partial, ifds } = file;
            drop(sink);
            commit_partial(&partial, &self.output)?;
            info!(path = %self.output.display(), levels = ifds, "Wrote pyramid");
            self.written.push(self.output.clone());
        }
        Ok(std::mem::take(&mut self.written))
    }
}

impl Drop for OutputEncoder {
    fn drop(&mut self) {
        if let Some(file) = self.pyramid_file.take() {
            drop(file.sink);
            let _ = std::fs::remove_file(&file.partial);
        }
    }
}
