use std::fs;
use std::path::{Path, PathBuf};
use image::{GrayImage, ImageFormat, RgbImage};

use crate::errors::{GranuloError, Result};

/// Micrograph file extensions accepted in batch mode.
const SUPPORTED_EXTENSIONS: [&str; 5] = ["tif", "tiff", "png", "bmp", "jpg"];

/// Represents an input micrograph with its metadata
pub struct InputImage {
    pub image: GrayImage,
    pub filename: String,
}

/// Get all supported image files from a directory (recursively)
pub fn get_image_files_in_dir<P: AsRef<Path>>(dir_path: P) -> Result<Vec<PathBuf>> {
    let dir_path = dir_path.as_ref();

    if !dir_path.exists() {
        return Err(GranuloError::InvalidPath(dir_path.to_path_buf()));
    }

    if !dir_path.is_dir() {
        return Err(GranuloError::Config(format!(
            "{} is not a directory",
            dir_path.display()
        )));
    }

    let mut files = Vec::new();
    find_image_files_recursive(dir_path, &mut files)?;
    files.sort();

    Ok(files)
}

fn find_image_files_recursive(dir_path: &Path, result: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir_path).map_err(GranuloError::Io)?;

    for entry in entries {
        let entry = entry.map_err(GranuloError::Io)?;
        let path = entry.path();

        if path.is_dir() {
            find_image_files_recursive(&path, result)?;
        } else if path.is_file() {
            if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                let ext = ext.to_ascii_lowercase();
                if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) || ext == "jpeg" {
                    result.push(path);
                }
            }
        }
    }

    Ok(())
}

/// Load a micrograph as 8-bit grayscale
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<InputImage> {
    let path = path.as_ref();

    let filename = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| GranuloError::InvalidPath(path.to_path_buf()))?
        .to_string();

    let img = image::open(path).map_err(GranuloError::Image)?;
    let gray = img.to_luma8();

    Ok(InputImage {
        image: gray,
        filename,
    })
}

/// Save a grayscale image as PNG
pub fn save_gray_image<P: AsRef<Path>>(image: &GrayImage, path: P) -> Result<()> {
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(GranuloError::Image)?;
    Ok(())
}

/// Save an RGB image as PNG
pub fn save_rgb_image<P: AsRef<Path>>(image: &RgbImage, path: P) -> Result<()> {
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(GranuloError::Image)?;
    Ok(())
}
