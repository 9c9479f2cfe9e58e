use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use std::f64::consts::PI;

/// Direction vectors for Moore-Neighbor contour tracing.
static MOORE_NEIGHBORHOOD: [(i32, i32); 8] = [
    (1, 0),   // right
    (1, 1),   // down-right
    (0, 1),   // down
    (-1, 1),  // down-left
    (-1, 0),  // left
    (-1, -1), // up-left
    (0, -1),  // up
    (1, -1),  // up-right
];

/// Moment-based ellipse fitted to a region's pixel distribution.
///
/// Axes follow the covariance-eigenvalue convention (4·sqrt(λ)), so a filled
/// disc of diameter d yields major ≈ minor ≈ d.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedEllipse {
    pub center_x: f64,
    pub center_y: f64,
    pub major_axis_px: f64,
    pub minor_axis_px: f64,
    pub angle_rad: f64,
}

/// A connected foreground component with its traced boundary and geometry.
///
/// Created once per component per analysis run and never mutated; downstream
/// stages either keep or drop it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRegion {
    /// Stable 1-based id in scan order of the first-encountered pixel.
    pub id: u32,
    pub pixel_area: u64,
    /// Centroid in pixel coordinates (x, y).
    pub centroid: (f64, f64),
    /// Outer boundary as a closed polygon of pixel coordinates.
    pub boundary: Vec<(u32, u32)>,
    pub ellipse: FittedEllipse,
    /// Length of the closed polygon through the traced boundary points.
    pub perimeter_px: f64,
}

impl RawRegion {
    /// Shape regularity: 4π·area/perimeter², 1.0 for a perfect circle.
    /// The traced polygon underestimates the perimeter of small compact
    /// blobs, which pushes the raw ratio above 1; the result is capped at
    /// 1.0 so it always stays within the filter's valid range.
    /// Zero when the boundary is too short to enclose anything.
    pub fn circularity(&self) -> f64 {
        if self.perimeter_px <= 0.0 {
            return 0.0;
        }
        (4.0 * PI * self.pixel_area as f64 / (self.perimeter_px * self.perimeter_px)).min(1.0)
    }
}

/// Per-label raw moment accumulator.
#[derive(Debug, Clone, Default)]
struct MomentAccumulator {
    count: u64,
    sum_x: f64,
    sum_y: f64,
    sum_xx: f64,
    sum_xy: f64,
    sum_yy: f64,
    seed: (u32, u32),
}

/// Extract 8-connected foreground components from a binary mask.
///
/// Regions are emitted in stable scan order (top-to-bottom, left-to-right by
/// first-encountered pixel), so ids are reproducible across runs on the same
/// mask. Components touching the image border are retained; exclusion is the
/// filter stage's job.
pub fn extract_regions(mask: &GrayImage) -> Vec<RawRegion> {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    // Accumulate moments in a single scan, recording labels in the order
    // their first pixel appears.
    let mut order: Vec<u32> = Vec::new();
    let mut accumulators: Vec<Option<MomentAccumulator>> = Vec::new();
    for y in 0..height {
        for x in 0..width {
            let label = labels.get_pixel(x, y)[0];
            if label == 0 {
                continue;
            }
            let idx = label as usize;
            if accumulators.len() <= idx {
                accumulators.resize(idx + 1, None);
            }
            let acc = accumulators[idx].get_or_insert_with(|| {
                order.push(label);
                MomentAccumulator {
                    seed: (x, y),
                    ..Default::default()
                }
            });
            let (fx, fy) = (x as f64, y as f64);
            acc.count += 1;
            acc.sum_x += fx;
            acc.sum_y += fy;
            acc.sum_xx += fx * fx;
            acc.sum_xy += fx * fy;
            acc.sum_yy += fy * fy;
        }
    }

    let mut regions = Vec::with_capacity(order.len());
    for (i, &label) in order.iter().enumerate() {
        let acc = accumulators[label as usize]
            .as_ref()
            .cloned()
            .unwrap_or_default();
        let boundary = trace_boundary(&labels, acc.seed, label);
        let perimeter_px = polygon_perimeter(&boundary);
        let ellipse = fit_ellipse(&acc);
        let centroid = (ellipse.center_x, ellipse.center_y);
        regions.push(RawRegion {
            id: (i + 1) as u32,
            pixel_area: acc.count,
            centroid,
            boundary,
            ellipse,
            perimeter_px,
        });
    }
    regions
}

/// Fit an ellipse from raw moment sums via the pixel-coordinate covariance.
fn fit_ellipse(acc: &MomentAccumulator) -> FittedEllipse {
    let n = acc.count as f64;
    let cx = acc.sum_x / n;
    let cy = acc.sum_y / n;

    // Central second moments
    let mu20 = acc.sum_xx / n - cx * cx;
    let mu02 = acc.sum_yy / n - cy * cy;
    let mu11 = acc.sum_xy / n - cx * cy;

    let common = ((mu20 - mu02) * (mu20 - mu02) + 4.0 * mu11 * mu11).sqrt();
    let lambda1 = ((mu20 + mu02 + common) / 2.0).max(0.0);
    let lambda2 = ((mu20 + mu02 - common) / 2.0).max(0.0);

    FittedEllipse {
        center_x: cx,
        center_y: cy,
        major_axis_px: 4.0 * lambda1.sqrt(),
        minor_axis_px: 4.0 * lambda2.sqrt(),
        angle_rad: 0.5 * (2.0 * mu11).atan2(mu20 - mu02),
    }
}

/// Trace the outer boundary of one labeled component with Moore-Neighbor
/// tracing, starting from its first scan-order pixel (always a boundary
/// pixel). Each boundary pixel is visited at most once, which guarantees
/// termination on any mask.
fn trace_boundary(
    labels: &image::ImageBuffer<Luma<u32>, Vec<u32>>,
    start: (u32, u32),
    label: u32,
) -> Vec<(u32, u32)> {
    let (width, height) = labels.dimensions();
    let is_region = |x: i32, y: i32| -> bool {
        x >= 0
            && y >= 0
            && x < width as i32
            && y < height as i32
            && labels.get_pixel(x as u32, y as u32)[0] == label
    };

    let mut contour = vec![start];
    let mut visited = vec![false; (width as usize) * (height as usize)];
    visited[(start.1 as usize) * width as usize + start.0 as usize] = true;

    let mut current = start;
    let mut backtrack_idx = 0;

    loop {
        let mut found_next = false;

        for i in 0..8 {
            let idx = (backtrack_idx + i) % 8;
            let (dx, dy) = MOORE_NEIGHBORHOOD[idx];
            let nx = current.0 as i32 + dx;
            let ny = current.1 as i32 + dy;

            if !is_region(nx, ny) {
                continue;
            }
            let (nx, ny) = (nx as u32, ny as u32);
            let flat = (ny as usize) * width as usize + nx as usize;
            if visited[flat] {
                continue;
            }
            // Only boundary pixels advance the trace: interior pixels have a
            // full 8-neighborhood inside the region.
            if !is_boundary_pixel(&is_region, nx, ny) {
                continue;
            }

            contour.push((nx, ny));
            visited[flat] = true;
            current = (nx, ny);
            backtrack_idx = (idx + 4) % 8;
            found_next = true;
            break;
        }

        if !found_next {
            break;
        }
    }

    contour
}

fn is_boundary_pixel(is_region: &dyn Fn(i32, i32) -> bool, x: u32, y: u32) -> bool {
    for &(dx, dy) in &MOORE_NEIGHBORHOOD {
        if !is_region(x as i32 + dx, y as i32 + dy) {
            return true;
        }
    }
    false
}

/// Perimeter of the closed polygon through the given points.
pub fn polygon_perimeter(points: &[(u32, u32)]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let n = points.len();
    let mut perimeter = 0.0;
    for i in 0..n {
        let (x1, y1) = points[i];
        let (x2, y2) = points[(i + 1) % n];
        let dx = x2 as f64 - x1 as f64;
        let dy = y2 as f64 - y1 as f64;
        perimeter += (dx * dx + dy * dy).sqrt();
    }
    perimeter
}
