// src/lib.rs - Library interface for Granulo

pub mod calibration;
pub mod config;
pub mod errors;
pub mod image_io;
pub mod measure;
pub mod output;
pub mod overlay;
pub mod pipeline;
pub mod preprocess;
pub mod region_filter;
pub mod regions;
pub mod stats;
pub mod threshold;

// Re-export commonly used types and functions
pub use errors::{GranuloError, Result};
pub use config::{CalibrationInput, Config};
pub use pipeline::{analyze, AnalysisConfig, AnalysisOutput};
pub use image_io::{load_image, save_gray_image, save_rgb_image, InputImage};

// Re-export the pipeline stages
pub use calibration::Calibration;
pub use preprocess::{auto_params, preprocess, PreprocessParams};
pub use threshold::{
    binarize, compute_cutoff, intensity_histogram, Polarity, ThresholdConfig, ThresholdMethod,
};
pub use regions::{extract_regions, FittedEllipse, RawRegion};
pub use region_filter::{filter_regions, FilterConfig};
pub use measure::{measure, Particle};
pub use stats::{
    fit_lognormal, summarize, DistributionSummary, Histogram, HistogramConfig, LognormalFit,
    Percentiles, SizeMetric,
};
pub use overlay::render_overlay;
