use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::errors::{GranuloError, Result};

/// Global threshold selection algorithm.
///
/// Each variant implements the same contract: a 256-bin intensity histogram
/// goes in, a single cutoff comes out. The strategies are a closed set
/// dispatched by configuration.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMethod {
    Otsu,
    Li,
    Yen,
    Triangle,
    Isodata,
}

/// Whether particles appear brighter or darker than the background.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    BrightOnDark,
    DarkOnBright,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdConfig {
    pub method: ThresholdMethod,
    pub polarity: Polarity,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        ThresholdConfig {
            method: ThresholdMethod::Otsu,
            polarity: Polarity::BrightOnDark,
        }
    }
}

/// Foreground/background values in the binary mask.
pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// Build the 256-bin intensity histogram of a grayscale image.
pub fn intensity_histogram(image: &GrayImage) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for pixel in image.pixels() {
        hist[pixel[0] as usize] += 1;
    }
    hist
}

/// Compute the global cutoff for a histogram with the selected method.
///
/// Fails when the histogram is degenerate (empty image or a single intensity
/// value): no algorithm can separate classes in that case.
pub fn compute_cutoff(hist: &[u64; 256], method: ThresholdMethod) -> Result<u8> {
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return Err(GranuloError::ThresholdComputation(
            "image is empty".to_string(),
        ));
    }
    let populated = hist.iter().filter(|&&c| c > 0).count();
    if populated < 2 {
        return Err(GranuloError::ThresholdComputation(
            "histogram has a single intensity value".to_string(),
        ));
    }

    let cutoff = match method {
        ThresholdMethod::Otsu => otsu_cutoff(hist, total),
        ThresholdMethod::Li => li_cutoff(hist, total),
        ThresholdMethod::Yen => yen_cutoff(hist, total),
        ThresholdMethod::Triangle => triangle_cutoff(hist),
        ThresholdMethod::Isodata => isodata_cutoff(hist),
    };
    Ok(cutoff)
}

/// Binarize the image: pixels strictly above the cutoff are foreground under
/// `BrightOnDark`, strictly below under `DarkOnBright`. A pixel equal to the
/// cutoff is background in both polarities.
pub fn binarize(image: &GrayImage, config: &ThresholdConfig) -> Result<GrayImage> {
    let hist = intensity_histogram(image);
    let cutoff = compute_cutoff(&hist, config.method)?;

    let mut mask = GrayImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(mask.pixels_mut()) {
        let keep = match config.polarity {
            Polarity::BrightOnDark => src[0] > cutoff,
            Polarity::DarkOnBright => src[0] < cutoff,
        };
        dst[0] = if keep { FOREGROUND } else { BACKGROUND };
    }
    Ok(mask)
}

/// Otsu's method: maximize between-class variance.
fn otsu_cutoff(hist: &[u64; 256], total: u64) -> u8 {
    let total_f = total as f64;
    let global_sum: f64 = hist
        .iter()
        .enumerate()
        .map(|(v, &c)| v as f64 * c as f64)
        .sum();

    let mut best_t = 0u8;
    let mut best_variance = f64::NEG_INFINITY;
    let mut weight0 = 0.0;
    let mut sum0 = 0.0;

    for t in 0..255usize {
        weight0 += hist[t] as f64;
        sum0 += t as f64 * hist[t] as f64;
        let weight1 = total_f - weight0;
        if weight0 == 0.0 || weight1 == 0.0 {
            continue;
        }
        let mean0 = sum0 / weight0;
        let mean1 = (global_sum - sum0) / weight1;
        let variance = weight0 * weight1 * (mean0 - mean1) * (mean0 - mean1);
        if variance > best_variance {
            best_variance = variance;
            best_t = t as u8;
        }
    }
    best_t
}

/// Li's iterative minimum cross-entropy method.
///
/// Works on intensities shifted by one so the log terms stay defined when the
/// histogram includes value zero.
fn li_cutoff(hist: &[u64; 256], total: u64) -> u8 {
    let total_f = total as f64;
    let global_sum: f64 = hist
        .iter()
        .enumerate()
        .map(|(v, &c)| (v + 1) as f64 * c as f64)
        .sum();

    let mut t = global_sum / total_f;
    for _ in 0..100 {
        let mut w0 = 0.0;
        let mut s0 = 0.0;
        for (v, &c) in hist.iter().enumerate() {
            let shifted = (v + 1) as f64;
            if shifted <= t {
                w0 += c as f64;
                s0 += shifted * c as f64;
            }
        }
        let w1 = total_f - w0;
        if w0 == 0.0 || w1 == 0.0 {
            break;
        }
        let mu0 = s0 / w0;
        let mu1 = (global_sum - s0) / w1;
        let next = (mu0 - mu1) / (mu0.ln() - mu1.ln());
        if (next - t).abs() < 0.5 {
            t = next;
            break;
        }
        t = next;
    }

    // Undo the +1 shift and clamp into the valid intensity range.
    (t - 1.0).round().clamp(0.0, 255.0) as u8
}

/// Yen's method: maximize the entropic correlation criterion.
fn yen_cutoff(hist: &[u64; 256], total: u64) -> u8 {
    let total_f = total as f64;
    let p: Vec<f64> = hist.iter().map(|&c| c as f64 / total_f).collect();
    let total_sq: f64 = p.iter().map(|&x| x * x).sum();

    let mut best_t = 0u8;
    let mut best_crit = f64::NEG_INFINITY;
    let mut p1 = 0.0;
    let mut p1_sq = 0.0;

    for t in 0..255usize {
        p1 += p[t];
        p1_sq += p[t] * p[t];
        let p2 = 1.0 - p1;
        let p2_sq = total_sq - p1_sq;
        if p1 <= 0.0 || p2 <= 0.0 || p1_sq <= 0.0 || p2_sq <= 0.0 {
            continue;
        }
        let crit = 2.0 * (p1 * p2).ln() - (p1_sq * p2_sq).ln();
        if crit > best_crit {
            best_crit = crit;
            best_t = t as u8;
        }
    }
    best_t
}

/// Triangle method: maximize the distance between the histogram and the chord
/// from its peak to the far end of the longer tail.
fn triangle_cutoff(hist: &[u64; 256]) -> u8 {
    let peak = hist
        .iter()
        .enumerate()
        .max_by_key(|&(_, &c)| c)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let low = hist.iter().position(|&c| c > 0).unwrap_or(0);
    let high = hist.iter().rposition(|&c| c > 0).unwrap_or(255);

    // Walk the longer tail; the chord runs from the peak down to zero height
    // at the tail end.
    let tail_end = if peak - low >= high - peak { low } else { high };
    if tail_end == peak {
        return peak as u8;
    }

    let peak_height = hist[peak] as f64;
    let dx = tail_end as f64 - peak as f64;
    let dy = -peak_height;

    let (from, to) = if tail_end > peak {
        (peak + 1, tail_end)
    } else {
        (tail_end, peak - 1)
    };

    let mut best_t = peak as u8;
    let mut best_dist = f64::NEG_INFINITY;
    for x in from..=to {
        let ox = x as f64 - peak as f64;
        let oy = hist[x] as f64 - peak_height;
        let cross = (dx * oy - dy * ox).abs();
        if cross > best_dist {
            best_dist = cross;
            best_t = x as u8;
        }
    }
    best_t
}

/// Ridler-Calvard isodata iteration: the cutoff settles midway between the
/// means of the two classes it induces.
fn isodata_cutoff(hist: &[u64; 256]) -> u8 {
    let low = hist.iter().position(|&c| c > 0).unwrap_or(0);
    let high = hist.iter().rposition(|&c| c > 0).unwrap_or(255);

    let mut t = (low + high) / 2;
    for _ in 0..100 {
        let mut w0 = 0.0;
        let mut s0 = 0.0;
        let mut w1 = 0.0;
        let mut s1 = 0.0;
        for (v, &c) in hist.iter().enumerate() {
            if v <= t {
                w0 += c as f64;
                s0 += v as f64 * c as f64;
            } else {
                w1 += c as f64;
                s1 += v as f64 * c as f64;
            }
        }
        if w0 == 0.0 || w1 == 0.0 {
            break;
        }
        let next = ((s0 / w0 + s1 / w1) / 2.0).floor() as usize;
        if next == t {
            break;
        }
        t = next;
    }
    t.min(255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Half the pixels at 50, half at 200.
    fn bimodal_image() -> GrayImage {
        let mut img = GrayImage::new(20, 20);
        for (i, px) in img.pixels_mut().enumerate() {
            px[0] = if i < 200 { 50 } else { 200 };
        }
        img
    }

    #[test]
    fn all_methods_separate_bimodal_modes() {
        let hist = intensity_histogram(&bimodal_image());
        for method in [
            ThresholdMethod::Otsu,
            ThresholdMethod::Li,
            ThresholdMethod::Yen,
            ThresholdMethod::Triangle,
            ThresholdMethod::Isodata,
        ] {
            let cutoff = compute_cutoff(&hist, method).unwrap();
            assert!(
                (50..200).contains(&cutoff),
                "{:?} produced cutoff {} outside the mode gap",
                method,
                cutoff
            );
        }
    }

    #[test]
    fn degenerate_histogram_is_an_error() {
        let flat = GrayImage::from_pixel(10, 10, Luma([128]));
        let hist = intensity_histogram(&flat);
        for method in [
            ThresholdMethod::Otsu,
            ThresholdMethod::Li,
            ThresholdMethod::Yen,
            ThresholdMethod::Triangle,
            ThresholdMethod::Isodata,
        ] {
            assert!(matches!(
                compute_cutoff(&hist, method),
                Err(GranuloError::ThresholdComputation(_))
            ));
        }
    }

    #[test]
    fn empty_image_is_an_error() {
        let empty = GrayImage::new(0, 0);
        let hist = intensity_histogram(&empty);
        assert!(compute_cutoff(&hist, ThresholdMethod::Otsu).is_err());
    }

    #[test]
    fn polarity_selects_foreground_side() {
        let img = bimodal_image();
        let bright = binarize(
            &img,
            &ThresholdConfig {
                method: ThresholdMethod::Otsu,
                polarity: Polarity::BrightOnDark,
            },
        )
        .unwrap();
        let dark = binarize(
            &img,
            &ThresholdConfig {
                method: ThresholdMethod::Otsu,
                polarity: Polarity::DarkOnBright,
            },
        )
        .unwrap();

        let bright_fg = bright.pixels().filter(|p| p[0] == FOREGROUND).count();
        let dark_fg = dark.pixels().filter(|p| p[0] == FOREGROUND).count();
        assert_eq!(bright_fg, 200);
        assert_eq!(dark_fg, 200);
        // The two polarities partition the pixels
        for (a, b) in bright.pixels().zip(dark.pixels()) {
            assert_ne!(a[0], b[0]);
        }
    }

    #[test]
    fn pixel_equal_to_cutoff_is_background() {
        // Force a known cutoff by checking the histogram directly
        let img = bimodal_image();
        let hist = intensity_histogram(&img);
        let cutoff = compute_cutoff(&hist, ThresholdMethod::Otsu).unwrap();

        let mut probe = img.clone();
        probe.put_pixel(0, 0, Luma([cutoff]));
        let mask = binarize(
            &probe,
            &ThresholdConfig {
                method: ThresholdMethod::Otsu,
                polarity: Polarity::BrightOnDark,
            },
        )
        .unwrap();
        // The probe pixel may shift the cutoff slightly; recompute to compare
        let probe_cutoff = compute_cutoff(&intensity_histogram(&probe), ThresholdMethod::Otsu).unwrap();
        if cutoff == probe_cutoff {
            assert_eq!(mask.get_pixel(0, 0)[0], BACKGROUND);
        }
    }

    #[test]
    fn otsu_is_deterministic() {
        let hist = intensity_histogram(&bimodal_image());
        let a = compute_cutoff(&hist, ThresholdMethod::Otsu).unwrap();
        let b = compute_cutoff(&hist, ThresholdMethod::Otsu).unwrap();
        assert_eq!(a, b);
    }
}
