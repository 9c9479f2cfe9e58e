use image::GrayImage;
use imageproc::filter::{gaussian_blur_f32, median_filter};
use serde::{Deserialize, Serialize};

use crate::errors::{GranuloError, Result};
use crate::threshold::intensity_histogram;

/// Denoising and contrast-stretch parameters.
///
/// Denoising always runs before the stretch; stretching first would amplify
/// the noise the filters are meant to remove.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PreprocessParams {
    /// Gaussian blur sigma; 0 disables the blur.
    #[serde(default)]
    pub gaussian_sigma: f32,
    /// Median filter kernel size; must be odd, 0 disables the filter.
    #[serde(default)]
    pub median_kernel_size: u32,
    /// Intensity mapped to 0 by the stretch.
    #[serde(default = "default_black_point")]
    pub black_point: u8,
    /// Intensity mapped to 255 by the stretch.
    #[serde(default = "default_white_point")]
    pub white_point: u8,
}

fn default_black_point() -> u8 {
    0
}

fn default_white_point() -> u8 {
    255
}

impl Default for PreprocessParams {
    fn default() -> Self {
        PreprocessParams {
            gaussian_sigma: 0.0,
            median_kernel_size: 0,
            black_point: 0,
            white_point: 255,
        }
    }
}

impl PreprocessParams {
    pub fn validate(&self) -> Result<()> {
        if !self.gaussian_sigma.is_finite() || self.gaussian_sigma < 0.0 {
            return Err(GranuloError::InvalidParameter(format!(
                "gaussian_sigma must be >= 0, got {}",
                self.gaussian_sigma
            )));
        }
        if self.median_kernel_size > 0 && self.median_kernel_size % 2 == 0 {
            return Err(GranuloError::InvalidParameter(format!(
                "median_kernel_size must be odd or 0, got {}",
                self.median_kernel_size
            )));
        }
        if self.black_point >= self.white_point {
            return Err(GranuloError::InvalidParameter(format!(
                "black_point ({}) must be below white_point ({})",
                self.black_point, self.white_point
            )));
        }
        Ok(())
    }
}

/// Apply denoising followed by a linear black/white point stretch.
///
/// Returns a new image; the input is never mutated.
pub fn preprocess(image: &GrayImage, params: &PreprocessParams) -> Result<GrayImage> {
    params.validate()?;

    let mut result = image.clone();

    if params.gaussian_sigma > 0.0 {
        result = gaussian_blur_f32(&result, params.gaussian_sigma);
    }

    if params.median_kernel_size > 0 {
        let radius = params.median_kernel_size / 2;
        result = median_filter(&result, radius, radius);
    }

    Ok(stretch_contrast(&result, params.black_point, params.white_point))
}

/// Linearly remap intensities so `black` maps to 0 and `white` to 255,
/// clamping everything outside that range.
fn stretch_contrast(image: &GrayImage, black: u8, white: u8) -> GrayImage {
    let span = (white - black) as f32;
    let mut out = GrayImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(out.pixels_mut()) {
        let normalized = ((src[0] as f32 - black as f32) / span).clamp(0.0, 1.0);
        dst[0] = (normalized * 255.0).round() as u8;
    }
    out
}

/// Derive preprocessing parameters from the image itself.
///
/// Black/white points come from the 1st and 99th percentiles of the intensity
/// histogram; the blur sigma scales with resolution so that large micrographs
/// get proportionally stronger smoothing. Deterministic.
pub fn auto_params(image: &GrayImage) -> PreprocessParams {
    let hist = intensity_histogram(image);
    let total: u64 = hist.iter().sum();

    let (mut black_point, mut white_point) = (0u8, 255u8);
    if total > 0 {
        let low_target = (total as f64 * 0.01).ceil() as u64;
        let high_target = (total as f64 * 0.99).ceil() as u64;
        let mut cumulative = 0u64;
        let mut low_found = false;
        for (value, &count) in hist.iter().enumerate() {
            cumulative += count;
            if !low_found && cumulative >= low_target {
                black_point = value as u8;
                low_found = true;
            }
            if cumulative >= high_target {
                white_point = value as u8;
                break;
            }
        }
    }

    // A flat histogram can collapse the percentiles onto one value; keep the
    // stretch well-formed in that case.
    if black_point >= white_point {
        black_point = 0;
        white_point = 255;
    }

    let longest_side = image.width().max(image.height()) as f32;
    let gaussian_sigma = (longest_side / 1024.0).clamp(0.5, 1.5);

    PreprocessParams {
        gaussian_sigma,
        median_kernel_size: 3,
        black_point,
        white_point,
    }
}
