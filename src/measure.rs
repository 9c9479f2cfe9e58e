use std::f64::consts::PI;

use crate::calibration::Calibration;
use crate::errors::{GranuloError, Result};
use crate::regions::RawRegion;

/// An accepted, fully measured particle.
///
/// Every field is populated at construction; records are immutable and each
/// one traces back to exactly one [`RawRegion`].
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub id: u32,
    pub pixel_area: u64,
    pub area_um2: f64,
    /// Minor axis of the fitted ellipse, in micrometers.
    pub short_axis_um: f64,
    /// Major axis of the fitted ellipse, in micrometers.
    pub long_axis_um: f64,
    /// (short + long) / 2.
    pub mean_diameter_um: f64,
    /// Diameter of the circle with the same area: 2·sqrt(area/π).
    pub equivalent_diameter_um: f64,
    /// Carried over from the traced boundary; dimensionless.
    pub circularity: f64,
    pub perimeter_px: f64,
}

/// Convert accepted regions into physical-unit particle records.
///
/// This is the single calibration gate of the pipeline: it fails with
/// `UncalibratedPipeline` when no calibration is available, so uncalibrated
/// measurements can never reach the statistics stage. Each pixel length is
/// multiplied by the factor exactly once (areas by the factor squared).
pub fn measure(regions: &[RawRegion], calibration: Option<Calibration>) -> Result<Vec<Particle>> {
    let calibration = calibration.ok_or(GranuloError::UncalibratedPipeline)?;

    Ok(regions
        .iter()
        .map(|region| {
            let short_axis_um = calibration.length_to_um(region.ellipse.minor_axis_px);
            let long_axis_um = calibration.length_to_um(region.ellipse.major_axis_px);
            let area_um2 = calibration.area_to_um2(region.pixel_area as f64);
            let equivalent_diameter_um =
                calibration.length_to_um(2.0 * (region.pixel_area as f64 / PI).sqrt());

            Particle {
                id: region.id,
                pixel_area: region.pixel_area,
                area_um2,
                short_axis_um,
                long_axis_um,
                mean_diameter_um: (short_axis_um + long_axis_um) / 2.0,
                equivalent_diameter_um,
                circularity: region.circularity(),
                perimeter_px: region.perimeter_px,
            }
        })
        .collect())
}
