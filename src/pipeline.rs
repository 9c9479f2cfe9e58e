use image::GrayImage;

use crate::calibration::Calibration;
use crate::errors::Result;
use crate::measure::{measure, Particle};
use crate::preprocess::{preprocess, PreprocessParams};
use crate::region_filter::{filter_regions, FilterConfig};
use crate::regions::{extract_regions, RawRegion};
use crate::stats::{summarize, DistributionSummary, HistogramConfig, SizeMetric};
use crate::threshold::{binarize, ThresholdConfig};

/// Everything one analysis run needs. The caller owns and threads this
/// across invocations; the pipeline holds no state of its own.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub calibration: Calibration,
    pub preprocess: PreprocessParams,
    pub threshold: ThresholdConfig,
    pub filter: FilterConfig,
    pub metric: SizeMetric,
    pub histogram: HistogramConfig,
}

/// Full result of one analysis run.
///
/// Intermediate artifacts are kept so a caller can render previews
/// (preprocessed image, binary mask, region overlay) without re-running
/// earlier stages.
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub preprocessed: GrayImage,
    pub mask: GrayImage,
    /// Accepted regions, post-filter, in extraction order.
    pub regions: Vec<RawRegion>,
    pub particles: Vec<Particle>,
    pub summary: DistributionSummary,
}

/// Run the full detection-and-measurement pipeline in its fixed order:
/// preprocess, binarize, extract, filter, measure, summarize.
///
/// Errors propagate from the stage that detects them; no stage substitutes
/// defaults for invalid input, and no partial output is returned.
pub fn analyze(image: &GrayImage, config: &AnalysisConfig) -> Result<AnalysisOutput> {
    let preprocessed = preprocess(image, &config.preprocess)?;
    let mask = binarize(&preprocessed, &config.threshold)?;
    let all_regions = extract_regions(&mask);
    let regions = filter_regions(all_regions, image.height(), &config.filter)?;
    let particles = measure(&regions, Some(config.calibration))?;
    let summary = summarize(&particles, config.metric, &config.histogram)?;

    Ok(AnalysisOutput {
        preprocessed,
        mask,
        regions,
        particles,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threshold::{Polarity, ThresholdMethod};
    use assert_approx_eq::assert_approx_eq;
    use image::Luma;

    /// 100x100 dark image with a 10x10 bright square centered at (50, 50).
    fn square_scene() -> GrayImage {
        let mut img = GrayImage::from_pixel(100, 100, Luma([20]));
        for y in 45..55 {
            for x in 45..55 {
                img.put_pixel(x, y, Luma([200]));
            }
        }
        img
    }

    fn scene_config() -> AnalysisConfig {
        AnalysisConfig {
            calibration: Calibration::from_lengths(100.0, 50.0).unwrap(),
            preprocess: PreprocessParams::default(),
            threshold: ThresholdConfig {
                method: ThresholdMethod::Otsu,
                polarity: Polarity::BrightOnDark,
            },
            filter: FilterConfig {
                min_area_px: 50,
                max_area_px: Some(200),
                min_circularity: 0.0,
                max_circularity: 1.0,
                exclude_bottom_fraction: 0.0,
            },
            metric: SizeMetric::EquivalentDiameter,
            histogram: HistogramConfig::default(),
        }
    }

    #[test]
    fn single_square_end_to_end() {
        let output = analyze(&square_scene(), &scene_config()).unwrap();

        assert_eq!(output.particles.len(), 1);
        let p = &output.particles[0];
        assert_eq!(p.pixel_area, 100);
        assert!(p.circularity < 1.0);
        // 2 * sqrt(100/pi) * 0.5 um/px
        assert_approx_eq!(
            p.equivalent_diameter_um,
            2.0 * (100.0f64 / std::f64::consts::PI).sqrt() * 0.5,
            1e-9
        );
        assert_eq!(output.summary.count, 1);
    }

    #[test]
    fn intermediate_artifacts_are_exposed() {
        let scene = square_scene();
        let output = analyze(&scene, &scene_config()).unwrap();

        assert_eq!(output.preprocessed.dimensions(), scene.dimensions());
        assert_eq!(output.mask.dimensions(), scene.dimensions());
        let fg = output
            .mask
            .pixels()
            .filter(|p| p[0] == crate::threshold::FOREGROUND)
            .count();
        assert_eq!(fg, 100);
        assert_eq!(output.regions.len(), 1);
    }

    #[test]
    fn analysis_is_deterministic() {
        let scene = square_scene();
        let config = scene_config();
        let a = analyze(&scene, &config).unwrap();
        let b = analyze(&scene, &config).unwrap();
        assert_eq!(a.particles, b.particles);
        assert_eq!(a.summary, b.summary);
    }

    #[test]
    fn flat_image_fails_at_threshold_stage() {
        let flat = GrayImage::from_pixel(50, 50, Luma([20]));
        let result = analyze(&flat, &scene_config());
        assert!(matches!(
            result,
            Err(crate::errors::GranuloError::ThresholdComputation(_))
        ));
    }

    #[test]
    fn filtered_out_particles_leave_empty_distribution() {
        let mut config = scene_config();
        config.filter.min_area_px = 500;
        let result = analyze(&square_scene(), &config);
        assert!(matches!(
            result,
            Err(crate::errors::GranuloError::EmptyDistribution(_))
        ));
    }
}
