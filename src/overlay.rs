use image::{GrayImage, Rgb, RgbImage};

use crate::regions::RawRegion;

/// Color used to mark accepted region boundaries in previews.
pub const BOUNDARY_COLOR: [u8; 3] = [0, 255, 0];

/// Render the detection overlay: the grayscale image with each accepted
/// region's traced boundary drawn on top.
///
/// Consumes only the already-computed boundaries; earlier pipeline stages
/// are never re-run for preview rendering.
pub fn render_overlay(image: &GrayImage, regions: &[RawRegion]) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut overlay = RgbImage::new(width, height);

    for (src, dst) in image.pixels().zip(overlay.pixels_mut()) {
        let v = src[0];
        *dst = Rgb([v, v, v]);
    }

    for region in regions {
        for &(x, y) in &region.boundary {
            if x < width && y < height {
                overlay.put_pixel(x, y, Rgb(BOUNDARY_COLOR));
            }
        }
    }

    overlay
}
