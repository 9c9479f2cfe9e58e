use std::fs;
use std::path::Path;
use csv::Writer;

use crate::errors::{GranuloError, Result};
use crate::measure::Particle;
use crate::stats::{DistributionSummary, LognormalFit};

/// Write the per-particle table to `<output_dir>/particles/<filename>.csv`.
///
/// Every accepted particle produces one fully populated row; there are no
/// partial records.
pub fn write_particles_csv<P: AsRef<Path>>(
    particles: &[Particle],
    output_dir: P,
    filename: &str,
) -> Result<()> {
    let output_path = output_dir
        .as_ref()
        .join("particles")
        .join(format!("{}.csv", filename));

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).map_err(GranuloError::Io)?;
    }

    let mut writer = Writer::from_path(&output_path).map_err(GranuloError::CsvOutput)?;

    writer
        .write_record([
            "Particle_Id",
            "Short_Axis_um",
            "Long_Axis_um",
            "Mean_Diameter_um",
            "Equivalent_Diameter_um",
            "Area_um2",
            "Circularity",
            "Pixel_Area",
            "Perimeter_px",
        ])
        .map_err(GranuloError::CsvOutput)?;

    for particle in particles {
        writer
            .write_record(&[
                particle.id.to_string(),
                format!("{:.6}", particle.short_axis_um),
                format!("{:.6}", particle.long_axis_um),
                format!("{:.6}", particle.mean_diameter_um),
                format!("{:.6}", particle.equivalent_diameter_um),
                format!("{:.6}", particle.area_um2),
                format!("{:.6}", particle.circularity),
                particle.pixel_area.to_string(),
                format!("{:.6}", particle.perimeter_px),
            ])
            .map_err(GranuloError::CsvOutput)?;
    }

    writer
        .flush()
        .map_err(|e| GranuloError::CsvOutput(csv::Error::from(e)))?;

    Ok(())
}

/// Write the distribution summary (one row) to
/// `<output_dir>/summary/<filename>.csv`.
pub fn write_summary_csv<P: AsRef<Path>>(
    summary: &DistributionSummary,
    lognormal: Option<&LognormalFit>,
    output_dir: P,
    filename: &str,
) -> Result<()> {
    let output_path = output_dir
        .as_ref()
        .join("summary")
        .join(format!("{}.csv", filename));

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).map_err(GranuloError::Io)?;
    }

    let mut writer = Writer::from_path(&output_path).map_err(GranuloError::CsvOutput)?;

    writer
        .write_record([
            "Metric",
            "Count",
            "Mean",
            "Std_Dev",
            "Min",
            "Max",
            "Geometric_Mean",
            "Geometric_Std_Dev",
            "D10",
            "D25",
            "D50",
            "D75",
            "D90",
            "Span",
            "Lognormal_Shape",
            "Lognormal_Scale",
            "Lognormal_R_Squared",
        ])
        .map_err(GranuloError::CsvOutput)?;

    let (shape, scale, r_squared) = match lognormal {
        Some(fit) => (
            format!("{:.6}", fit.shape),
            format!("{:.6}", fit.scale),
            format!("{:.6}", fit.r_squared),
        ),
        None => ("".to_string(), "".to_string(), "".to_string()),
    };

    writer
        .write_record(&[
            summary.metric.label().to_string(),
            summary.count.to_string(),
            format!("{:.6}", summary.arithmetic_mean),
            format!("{:.6}", summary.std_dev),
            format!("{:.6}", summary.min),
            format!("{:.6}", summary.max),
            format!("{:.6}", summary.geometric_mean),
            format!("{:.6}", summary.geometric_std_dev),
            format!("{:.6}", summary.percentiles.d10),
            format!("{:.6}", summary.percentiles.d25),
            format!("{:.6}", summary.percentiles.d50),
            format!("{:.6}", summary.percentiles.d75),
            format!("{:.6}", summary.percentiles.d90),
            format!("{:.6}", summary.span),
            shape,
            scale,
            r_squared,
        ])
        .map_err(GranuloError::CsvOutput)?;

    writer
        .flush()
        .map_err(|e| GranuloError::CsvOutput(csv::Error::from(e)))?;

    Ok(())
}
