use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::calibration::Calibration;
use crate::errors::{GranuloError, Result};
use crate::preprocess::PreprocessParams;
use crate::region_filter::FilterConfig;
use crate::stats::{HistogramConfig, SizeMetric};
use crate::threshold::ThresholdConfig;

/// Configuration for Granulo
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub input_path: String,
    pub output_base_dir: String,

    /// Scale calibration; the pipeline is blocked until this resolves.
    pub calibration: CalibrationInput,

    /// Derive denoise/stretch parameters from each image instead of using
    /// the explicit `preprocess` section.
    #[serde(default)]
    pub auto_preprocess: bool,

    #[serde(default)]
    pub preprocess: PreprocessParams,

    #[serde(default)]
    pub threshold: ThresholdConfig,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default = "default_metric")]
    pub metric: SizeMetric,

    #[serde(default)]
    pub histogram: HistogramConfig,

    #[serde(default = "default_parallel")]
    pub use_parallel: bool,
}

fn default_metric() -> SizeMetric {
    SizeMetric::EquivalentDiameter
}

fn default_parallel() -> bool {
    true
}

/// Calibration as it arrives from the outside: a known factor, a reference
/// segment drawn on the image, or a measured pixel/real length pair. The
/// core never depends on how the coordinates were obtained.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum CalibrationInput {
    Factor {
        units_per_pixel: f64,
    },
    ReferenceLine {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        real_length_um: f64,
    },
    Lengths {
        pixel_length: f64,
        real_length_um: f64,
    },
}

impl CalibrationInput {
    /// Resolve the input into a validated calibration factor.
    pub fn resolve(&self) -> Result<Calibration> {
        match *self {
            CalibrationInput::Factor { units_per_pixel } => {
                Calibration::from_factor(units_per_pixel)
            }
            CalibrationInput::ReferenceLine {
                x1,
                y1,
                x2,
                y2,
                real_length_um,
            } => Calibration::from_reference_line((x1, y1), (x2, y2), real_length_um),
            CalibrationInput::Lengths {
                pixel_length,
                real_length_um,
            } => Calibration::from_lengths(pixel_length, real_length_um),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(GranuloError::Io)?;

        let config: Config = toml::from_str(&content).map_err(|e| GranuloError::ConfigLoad {
            source: e,
            path: path.to_path_buf(),
        })?;

        Ok(config)
    }

    /// A default configuration for the given input/output locations
    pub fn default_config(input_path: &str, output_base_dir: &str) -> Self {
        Config {
            input_path: input_path.to_string(),
            output_base_dir: output_base_dir.to_string(),
            calibration: CalibrationInput::Factor {
                units_per_pixel: 1.0,
            },
            auto_preprocess: true,
            preprocess: PreprocessParams::default(),
            threshold: ThresholdConfig::default(),
            filter: FilterConfig::default(),
            metric: default_metric(),
            histogram: HistogramConfig::default(),
            use_parallel: true,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let input_path = PathBuf::from(&self.input_path);
        if !input_path.exists() {
            return Err(GranuloError::InvalidPath(input_path));
        }

        self.calibration.resolve()?;
        if !self.auto_preprocess {
            self.preprocess.validate()?;
        }
        self.filter.validate()?;
        self.histogram.validate()?;

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| GranuloError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content).map_err(GranuloError::Io)?;

        Ok(())
    }
}
