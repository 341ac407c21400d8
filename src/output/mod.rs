//! Writing processed slides to disk.
//!
//! - [`OutputEncoder`]: composited levels as independent files or one
//!   pyramid TIFF, plus the optional mask snapshot
//! - [`metadata`]: the JSON sidecar describing a processed slide
//!
//! Every file is first written to a sibling `*.partial` path and renamed
//! into place once complete, so a failed slide never leaves a truncated
//! file under its final name.

pub mod encoder;
pub mod metadata;

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::MaskError;

pub use encoder::{OutputEncoder, OutputFileType, BIGTIFF_THRESHOLD};
pub use metadata::{write_metadata, LevelRecord, ProcessingMetadata, SlideSummary};

// =============================================================================
// Compression
// =============================================================================

/// Lossless compression applied to TIFF output.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputCompression {
    #[default]
    Lzw,
    Zlib,
    None,
}

impl OutputCompression {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OutputCompression::Lzw => "lzw",
            OutputCompression::Zlib => "zlib",
            OutputCompression::None => "none",
        }
    }

    /// Encoder setting for the `tiff` crate.
    pub fn to_tiff(self) -> tiff::encoder::Compression {
        use tiff::encoder::{Compression, DeflateLevel};
        match self {
            OutputCompression::Lzw => Compression::Lzw,
            OutputCompression::Zlib => Compression::Deflate(DeflateLevel::default()),
            OutputCompression::None => Compression::Uncompressed,
        }
    }
}

impl fmt::Display for OutputCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Partial Files
// =============================================================================

/// `dir/name.ext` -> `dir/name.ext.partial`
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".partial");
    path.with_file_name(name)
}

/// Move a completed partial file to its final name.
pub(crate) fn commit_partial(partial: &Path, path: &Path) -> Result<(), MaskError> {
    std::fs::rename(partial, path).map_err(|e| {
        let _ = std::fs::remove_file(partial);
        MaskError::write_failure(path, e)
    })
}

/// Run `write` against the partial path of `path`, then commit it.
///
/// On failure the partial file is removed and the error is reported
/// against `path`.
pub(crate) fn write_via_partial<E, F>(path: &Path, write: F) -> Result<(), MaskError>
where
    E: fmt::Display,
    F: FnOnce(&Path) -> Result<(), E>,
{
    let partial = partial_path(path);
    if let Err(e) = write(&partial) {
        let _ = std::fs::remove_file(&partial);
        return Err(MaskError::write_failure(path, e));
    }
    commit_partial(&partial, path)
}
