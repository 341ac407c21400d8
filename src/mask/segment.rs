//! Global-threshold tissue segmentation.
//!
//! Tissue absorbs light in transmitted-light microscopy, so it is darker
//! than the glass around it. A pixel is tissue when its blurred intensity
//! is at or below the threshold. Stains or modalities where tissue is
//! brighter than background are not handled.

use image::{GrayImage, Luma, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::filter::gaussian_blur_f32;
use serde::{Deserialize, Serialize};

use crate::error::MaskError;

use super::{TissueMask, BACKGROUND, TISSUE};

pub const DEFAULT_MULTIPLIER: f64 = 1.05;
pub const DEFAULT_SIGMA: f64 = 1.0;

/// Threshold selection and smoothing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentationParams {
    /// Explicit threshold; `None` selects Otsu's method
    pub threshold: Option<i64>,

    /// Scale applied to the Otsu threshold
    pub multiplier: f64,

    /// Gaussian blur standard deviation; 0 disables blurring
    pub sigma: f64,
}

impl Default for SegmentationParams {
    fn default() -> Self {
        Self {
            threshold: None,
            multiplier: DEFAULT_MULTIPLIER,
            sigma: DEFAULT_SIGMA,
        }
    }
}

impl SegmentationParams {
    /// Check every parameter against its accepted domain.
    pub fn validate(&self) -> Result<(), MaskError> {
        if let Some(t) = self.threshold {
            if !(0..=255).contains(&t) {
                return Err(MaskError::InvalidThreshold(t));
            }
        }
        if !self.multiplier.is_finite() || self.multiplier < 0.0 {
            return Err(MaskError::InvalidParameter {
                name: "multiplier",
                message: format!("{} is not a finite non-negative number", self.multiplier),
            });
        }
        if !self.sigma.is_finite() || self.sigma < 0.0 {
            return Err(MaskError::InvalidParameter {
                name: "sigma",
                message: format!("{} is not a finite non-negative number", self.sigma),
            });
        }
        Ok(())
    }
}

/// Result of segmenting one raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub mask: TissueMask,

    /// Threshold the mask was cut at, explicit or computed
    pub threshold: u8,

    /// Otsu level of the blurred intensity, before the multiplier
    pub otsu_level: Option<u8>,
}

// =============================================================================
// Stages
// =============================================================================

/// Single-channel intensity using ITU-R BT.601 luma weights.
pub fn to_intensity(raster: &RgbImage) -> GrayImage {
    GrayImage::from_fn(raster.width(), raster.height(), |x, y| {
        let [r, g, b] = raster.get_pixel(x, y).0;
        let weighted = 299 * r as u32 + 587 * g as u32 + 114 * b as u32;
        Luma([((weighted + 500) / 1000) as u8])
    })
}

/// Gaussian blur; `sigma == 0` returns the input unchanged.
///
/// So does any sigma too small for an `f32` kernel: its weights collapse
/// onto the centre pixel.
pub fn blur(intensity: &GrayImage, sigma: f64) -> GrayImage {
    let sigma = sigma as f32;
    // The kernel divides by 2σ², which must stay a normal f32
    let usable = sigma >= f32::MIN_POSITIVE && (2.0 * sigma * sigma).is_normal();
    if !usable || intensity.width() == 0 || intensity.height() == 0 {
        return intensity.clone();
    }
    gaussian_blur_f32(intensity, sigma)
}

/// Otsu's threshold of an intensity raster.
pub fn otsu_threshold(intensity: &GrayImage) -> u8 {
    if intensity.width() == 0 || intensity.height() == 0 {
        return 0;
    }
    otsu_level(intensity)
}

/// Scale an Otsu level, rounding and clamping into the 8-bit range.
///
/// Non-decreasing in `multiplier`.
pub fn effective_threshold(otsu: u8, multiplier: f64) -> u8 {
    let scaled = (otsu as f64 * multiplier.max(0.0)).round();
    scaled.clamp(0.0, 255.0) as u8
}

/// Compute the tissue mask of `raster`, tagged with `level`.
pub fn segment(
    raster: &RgbImage,
    level: usize,
    params: &SegmentationParams,
) -> Result<Segmentation, MaskError> {
    params.validate()?;

    let intensity = blur(&to_intensity(raster), params.sigma);
    let (threshold, otsu) = match params.threshold {
        Some(explicit) => (explicit as u8, None),
        None => {
            let otsu = otsu_threshold(&intensity);
            (effective_threshold(otsu, params.multiplier), Some(otsu))
        }
    };

    let pixels = GrayImage::from_fn(intensity.width(), intensity.height(), |x, y| {
        let value = intensity.get_pixel(x, y).0[0];
        Luma([if value <= threshold { TISSUE } else { BACKGROUND }])
    });

    Ok(Segmentation {
        mask: TissueMask::new(level, pixels),
        threshold,
        otsu_level: otsu,
    })
}
