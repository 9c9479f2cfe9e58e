use serde::{Deserialize, Serialize};

use crate::errors::{GranuloError, Result};
use crate::regions::RawRegion;

/// Shape and position acceptance bounds for extracted regions.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FilterConfig {
    #[serde(default = "default_min_area_px")]
    pub min_area_px: u64,
    /// Upper area bound; `None` leaves it unbounded.
    #[serde(default)]
    pub max_area_px: Option<u64>,
    #[serde(default)]
    pub min_circularity: f64,
    #[serde(default = "default_max_circularity")]
    pub max_circularity: f64,
    /// Fraction of the image height, measured from the bottom, to exclude
    /// (sample-stage artifacts such as scale bars and stage edges).
    #[serde(default)]
    pub exclude_bottom_fraction: f64,
}

fn default_min_area_px() -> u64 {
    10
}

fn default_max_circularity() -> f64 {
    1.0
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            min_area_px: default_min_area_px(),
            max_area_px: None,
            min_circularity: 0.0,
            max_circularity: 1.0,
            exclude_bottom_fraction: 0.0,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(max_area) = self.max_area_px {
            if self.min_area_px > max_area {
                return Err(GranuloError::InvalidParameter(format!(
                    "min_area_px ({}) exceeds max_area_px ({})",
                    self.min_area_px, max_area
                )));
            }
        }
        if !self.min_circularity.is_finite()
            || !self.max_circularity.is_finite()
            || self.min_circularity < 0.0
            || self.max_circularity > 1.0
            || self.min_circularity > self.max_circularity
        {
            return Err(GranuloError::InvalidParameter(format!(
                "circularity bounds [{}, {}] must satisfy 0 <= min <= max <= 1",
                self.min_circularity, self.max_circularity
            )));
        }
        if !self.exclude_bottom_fraction.is_finite()
            || self.exclude_bottom_fraction < 0.0
            || self.exclude_bottom_fraction >= 1.0
        {
            return Err(GranuloError::InvalidParameter(format!(
                "exclude_bottom_fraction must be in [0, 1), got {}",
                self.exclude_bottom_fraction
            )));
        }
        Ok(())
    }
}

/// Keep regions that pass every acceptance rule, preserving order.
///
/// Rules are applied per region in a fixed order: bottom-strip exclusion,
/// area bounds, circularity bounds. A region whose centroid lies exactly on
/// the strip cutoff row is excluded (the `>=` side of the inequality).
/// Regions are never altered, only kept or dropped, so filtering an already
/// filtered sequence with the same config is a no-op.
pub fn filter_regions(
    regions: Vec<RawRegion>,
    image_height: u32,
    config: &FilterConfig,
) -> Result<Vec<RawRegion>> {
    config.validate()?;

    let cutoff_y = image_height as f64 * (1.0 - config.exclude_bottom_fraction);

    Ok(regions
        .into_iter()
        .filter(|region| {
            if region.centroid.1 >= cutoff_y {
                return false;
            }
            if region.pixel_area < config.min_area_px {
                return false;
            }
            if let Some(max_area) = config.max_area_px {
                if region.pixel_area > max_area {
                    return false;
                }
            }
            let circularity = region.circularity();
            circularity >= config.min_circularity && circularity <= config.max_circularity
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::extract_regions;
    use crate::threshold::{BACKGROUND, FOREGROUND};
    use image::{GrayImage, Luma};

    fn square_region(cx: u32, cy: u32, side: u32, canvas: u32) -> Vec<RawRegion> {
        let mut mask = GrayImage::from_pixel(canvas, canvas, Luma([BACKGROUND]));
        let half = side / 2;
        for y in cy - half..cy - half + side {
            for x in cx - half..cx - half + side {
                mask.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
        extract_regions(&mask)
    }

    #[test]
    fn area_bounds_reject_outside_range() {
        let regions = square_region(50, 50, 10, 100); // area 100
        let config = FilterConfig {
            min_area_px: 50,
            max_area_px: Some(200),
            ..Default::default()
        };
        assert_eq!(filter_regions(regions.clone(), 100, &config).unwrap().len(), 1);

        let tight = FilterConfig {
            min_area_px: 101,
            ..Default::default()
        };
        assert!(filter_regions(regions.clone(), 100, &tight).unwrap().is_empty());

        let capped = FilterConfig {
            min_area_px: 1,
            max_area_px: Some(99),
            ..Default::default()
        };
        assert!(filter_regions(regions, 100, &capped).unwrap().is_empty());
    }

    #[test]
    fn circularity_bounds_reject_square() {
        let regions = square_region(50, 50, 10, 100);
        let config = FilterConfig {
            min_area_px: 1,
            min_circularity: 0.99,
            ..Default::default()
        };
        assert!(filter_regions(regions, 100, &config).unwrap().is_empty());
    }

    #[test]
    fn small_compact_region_passes_widest_bounds() {
        // A 5x5 blob's traced perimeter is short enough that the raw shape
        // ratio exceeds 1; it must still be acceptable at the widest bounds
        let regions = square_region(50, 50, 5, 100); // area 25
        assert_eq!(regions.len(), 1);

        let widest = FilterConfig {
            min_area_px: 1,
            min_circularity: 0.0,
            max_circularity: 1.0,
            ..Default::default()
        };
        assert_eq!(filter_regions(regions.clone(), 100, &widest).unwrap().len(), 1);

        // And with the default minimum area of 10 it still passes
        let defaults = FilterConfig::default();
        assert_eq!(filter_regions(regions, 100, &defaults).unwrap().len(), 1);
    }

    #[test]
    fn bottom_strip_excludes_centroid_on_cutoff() {
        // 9x9 square spanning rows 46..=54: centroid at exactly y = 50
        let regions = square_region(50, 50, 9, 100);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].centroid.1, 50.0);

        // Cutoff row 100 * (1 - 0.5) = 50: the centroid sits on it, excluded
        let at = FilterConfig {
            min_area_px: 1,
            exclude_bottom_fraction: 0.5,
            ..Default::default()
        };
        assert!(filter_regions(regions.clone(), 100, &at).unwrap().is_empty());

        // Cutoff row 60, centroid above it: included
        let below = FilterConfig {
            min_area_px: 1,
            exclude_bottom_fraction: 0.4,
            ..Default::default()
        };
        assert_eq!(filter_regions(regions, 100, &below).unwrap().len(), 1);
    }

    #[test]
    fn filtering_is_idempotent() {
        let regions = square_region(50, 50, 10, 100);
        let config = FilterConfig {
            min_area_px: 50,
            max_area_px: Some(200),
            exclude_bottom_fraction: 0.2,
            ..Default::default()
        };
        let once = filter_regions(regions, 100, &config).unwrap();
        let twice = filter_regions(once.clone(), 100, &config).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn invalid_bounds_rejected() {
        let bad_area = FilterConfig {
            min_area_px: 500,
            max_area_px: Some(100),
            ..Default::default()
        };
        assert!(bad_area.validate().is_err());

        let bad_circ = FilterConfig {
            min_circularity: 0.9,
            max_circularity: 0.5,
            ..Default::default()
        };
        assert!(bad_circ.validate().is_err());

        let bad_fraction = FilterConfig {
            exclude_bottom_fraction: 1.0,
            ..Default::default()
        };
        assert!(bad_fraction.validate().is_err());
    }
}
