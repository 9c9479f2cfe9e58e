use thiserror::Error;
use std::io;
use std::path::PathBuf;

/// Custom error types for Granulo
#[derive(Error, Debug)]
pub enum GranuloError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("Invalid calibration input: {0}")]
    InvalidCalibration(String),

    #[error("Threshold computation failed: {0}")]
    ThresholdComputation(String),

    #[error("Pipeline is not calibrated: measurement requires a positive scale factor")]
    UncalibratedPipeline,

    #[error("Empty distribution: {0}")]
    EmptyDistribution(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("CSV output error: {0}")]
    CsvOutput(#[from] csv::Error),

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, GranuloError>;
