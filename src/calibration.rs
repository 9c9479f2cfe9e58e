use crate::errors::{GranuloError, Result};

/// Reference segments shorter than this (in pixels) are considered degenerate.
const MIN_PIXEL_DISTANCE: f64 = 1e-6;

/// Pixel-to-physical-length conversion factor (micrometers per pixel).
///
/// Every measurement stage receives this explicitly; nothing downstream
/// re-derives the scale. The inner value is always finite and positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    units_per_pixel: f64,
}

impl Calibration {
    /// Build a calibration directly from a known factor (μm per pixel).
    pub fn from_factor(units_per_pixel: f64) -> Result<Self> {
        if !units_per_pixel.is_finite() || units_per_pixel <= 0.0 {
            return Err(GranuloError::InvalidCalibration(format!(
                "scale factor must be a positive finite number, got {}",
                units_per_pixel
            )));
        }
        Ok(Calibration { units_per_pixel })
    }

    /// Build a calibration from a reference segment drawn on the image.
    ///
    /// The endpoints are pixel coordinates; `real_length_um` is the known
    /// physical length of the segment.
    pub fn from_reference_line(
        start: (f64, f64),
        end: (f64, f64),
        real_length_um: f64,
    ) -> Result<Self> {
        let dx = end.0 - start.0;
        let dy = end.1 - start.1;
        let pixel_distance = (dx * dx + dy * dy).sqrt();
        Self::from_lengths(pixel_distance, real_length_um)
    }

    /// Build a calibration from a measured pixel length and its real length.
    pub fn from_lengths(pixel_length: f64, real_length_um: f64) -> Result<Self> {
        if !pixel_length.is_finite() || pixel_length <= MIN_PIXEL_DISTANCE {
            return Err(GranuloError::InvalidCalibration(format!(
                "reference length of {} px is degenerate",
                pixel_length
            )));
        }
        if !real_length_um.is_finite() || real_length_um <= 0.0 {
            return Err(GranuloError::InvalidCalibration(format!(
                "real length must be positive, got {} um",
                real_length_um
            )));
        }
        Ok(Calibration {
            units_per_pixel: real_length_um / pixel_length,
        })
    }

    /// Micrometers per pixel.
    #[inline]
    pub fn units_per_pixel(&self) -> f64 {
        self.units_per_pixel
    }

    /// Convert a pixel length to micrometers.
    #[inline]
    pub fn length_to_um(&self, pixels: f64) -> f64 {
        pixels * self.units_per_pixel
    }

    /// Convert a pixel area to square micrometers.
    #[inline]
    pub fn area_to_um2(&self, pixel_area: f64) -> f64 {
        pixel_area * self.units_per_pixel * self.units_per_pixel
    }
}
