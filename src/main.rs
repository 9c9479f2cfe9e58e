mod calibration;
mod config;
mod errors;
mod image_io;
mod measure;
mod output;
mod overlay;
mod pipeline;
mod preprocess;
mod region_filter;
mod regions;
mod stats;
mod threshold;

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use rayon::prelude::*;

use calibration::Calibration;
use config::Config;
use errors::{GranuloError, Result};
use image_io::{get_image_files_in_dir, load_image, save_gray_image, save_rgb_image, InputImage};
use overlay::render_overlay;
use pipeline::{analyze, AnalysisConfig};
use stats::fit_lognormal;

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Granulo - SEM particle-size distribution analysis")]
struct Args {
    /// Path to input file or directory
    #[clap(short, long)]
    input: Option<String>,

    /// Path to output directory
    #[clap(short, long)]
    output: Option<String>,

    /// Path to configuration file
    #[clap(short, long, default_value = "config.toml")]
    config: String,

    /// Write a default configuration file to the given path and exit
    #[clap(long)]
    write_default_config: Option<String>,

    /// Enable debug mode (save intermediate images and print more info)
    #[clap(short, long)]
    debug: bool,
}

/// Main function
fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = args.write_default_config {
        let config = Config::default_config("input/", "output/");
        config.save_to_file(&path)?;
        println!("Wrote default configuration to {}", path);
        return Ok(());
    }

    // Load configuration
    let mut config = Config::from_file(&args.config)?;

    // Override config with command-line arguments
    if let Some(input) = args.input {
        config.input_path = input;
    }
    if let Some(output) = args.output {
        config.output_base_dir = output;
    }

    config.validate()?;

    // Resolve the scale once; every image in the batch shares it
    let cal = config.calibration.resolve()?;

    let start_time = Instant::now();

    let output_base = PathBuf::from(&config.output_base_dir);
    fs::create_dir_all(output_base.join("particles"))?;
    fs::create_dir_all(output_base.join("summary"))?;
    if args.debug {
        fs::create_dir_all(output_base.join("debug"))?;
    }

    let input_path = PathBuf::from(&config.input_path);

    if input_path.is_file() {
        println!("Processing single file: {}", input_path.display());
        let input_image = load_image(&input_path)?;
        process_image(input_image, &config, cal, args.debug)?;
    } else if input_path.is_dir() {
        println!("Processing directory: {}", input_path.display());
        let files = get_image_files_in_dir(&input_path)?;
        println!("Found {} image files", files.len());

        if config.use_parallel {
            files
                .par_iter()
                .map(|path| {
                    println!("Processing: {}", path.display());
                    match load_image(path) {
                        Ok(input_image) => {
                            process_image(input_image, &config, cal, args.debug).map_err(|e| {
                                eprintln!("Error processing {}: {}", path.display(), e);
                                e
                            })
                        }
                        Err(e) => {
                            eprintln!("Error loading {}: {}", path.display(), e);
                            Err(e)
                        }
                    }
                })
                .collect::<Vec<_>>();
        } else {
            for path in &files {
                println!("Processing: {}", path.display());
                let input_image = load_image(path)?;
                process_image(input_image, &config, cal, args.debug)?;
            }
        }
    } else {
        return Err(GranuloError::InvalidPath(input_path));
    }

    let elapsed = start_time.elapsed();
    println!("Processing completed in {:.2} seconds", elapsed.as_secs_f64());

    Ok(())
}

/// Run the pipeline on one micrograph and write its outputs.
fn process_image(
    input_image: InputImage,
    config: &Config,
    cal: Calibration,
    debug: bool,
) -> Result<()> {
    let InputImage { image, filename } = input_image;

    let preprocess_params = if config.auto_preprocess {
        preprocess::auto_params(&image)
    } else {
        config.preprocess.clone()
    };

    if debug {
        println!(
            "Preprocess params for {}: sigma={:.2}, median={}, black={}, white={}",
            filename,
            preprocess_params.gaussian_sigma,
            preprocess_params.median_kernel_size,
            preprocess_params.black_point,
            preprocess_params.white_point
        );
    }

    let analysis_config = AnalysisConfig {
        calibration: cal,
        preprocess: preprocess_params,
        threshold: config.threshold,
        filter: config.filter.clone(),
        metric: config.metric,
        histogram: config.histogram,
    };

    let result = analyze(&image, &analysis_config)?;

    println!(
        "{}: {} particles, {} = {:.3} um (geometric mean {:.3} um)",
        filename,
        result.particles.len(),
        config.metric.label(),
        result.summary.arithmetic_mean,
        result.summary.geometric_mean
    );

    // Lognormal fit is reported when enough particles survive; a failed fit
    // is not an analysis error
    let metric_values: Vec<f64> = result
        .particles
        .iter()
        .map(|p| config.metric.value_of(p))
        .collect();
    let lognormal = fit_lognormal(&metric_values).ok();

    output::write_particles_csv(&result.particles, &config.output_base_dir, &filename)?;
    output::write_summary_csv(
        &result.summary,
        lognormal.as_ref(),
        &config.output_base_dir,
        &filename,
    )?;

    if debug {
        let debug_dir = PathBuf::from(&config.output_base_dir).join("debug");
        save_gray_image(
            &result.preprocessed,
            debug_dir.join(format!("{}_preprocessed.png", filename)),
        )?;
        save_gray_image(&result.mask, debug_dir.join(format!("{}_mask.png", filename)))?;
        let overlay = render_overlay(&result.preprocessed, &result.regions);
        save_rgb_image(&overlay, debug_dir.join(format!("{}_overlay.png", filename)))?;
        println!(
            "Debug images for {}: preprocessed, mask, overlay ({} regions kept)",
            filename,
            result.regions.len()
        );
    }

    Ok(())
}
