use serde::{Deserialize, Serialize};

use crate::errors::{GranuloError, Result};
use crate::measure::Particle;

/// Which per-particle length drives the distribution summary.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SizeMetric {
    ShortAxis,
    LongAxis,
    MeanDiameter,
    EquivalentDiameter,
}

impl SizeMetric {
    pub fn value_of(&self, particle: &Particle) -> f64 {
        match self {
            SizeMetric::ShortAxis => particle.short_axis_um,
            SizeMetric::LongAxis => particle.long_axis_um,
            SizeMetric::MeanDiameter => particle.mean_diameter_um,
            SizeMetric::EquivalentDiameter => particle.equivalent_diameter_um,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SizeMetric::ShortAxis => "short_axis_um",
            SizeMetric::LongAxis => "long_axis_um",
            SizeMetric::MeanDiameter => "mean_diameter_um",
            SizeMetric::EquivalentDiameter => "equivalent_diameter_um",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistogramConfig {
    /// Bin count; `None` derives it from the sample size (Sturges' rule).
    #[serde(default)]
    pub bins: Option<usize>,
}

impl HistogramConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bins == Some(0) {
            return Err(GranuloError::InvalidParameter(
                "histogram bin count must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    fn resolve(&self, sample_size: usize) -> usize {
        match self.bins {
            Some(bins) => bins,
            None => sturges_bins(sample_size),
        }
    }
}

/// Sturges' rule: ceil(log2 n) + 1, at least 1.
fn sturges_bins(n: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    (n as f64).log2().ceil() as usize + 1
}

/// Binned counts with explicit edges (`edges.len() == counts.len() + 1`).
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<u64>,
}

/// D-value percentiles of the metric (linear interpolation).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Percentiles {
    pub d10: f64,
    pub d25: f64,
    pub d50: f64,
    pub d75: f64,
    pub d90: f64,
}

/// Distribution summary over the accepted particle set.
///
/// Recomputed from scratch whenever the particle set changes; never persisted
/// independently of its source set.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionSummary {
    pub metric: SizeMetric,
    pub count: usize,
    pub arithmetic_mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub geometric_mean: f64,
    pub geometric_std_dev: f64,
    pub percentiles: Percentiles,
    /// (d90 - d10) / d50, a common width measure for size distributions.
    pub span: f64,
    pub linear_histogram: Histogram,
    pub log_histogram: Histogram,
}

/// Summarize the selected metric over the particle set.
///
/// Geometric statistics are computed in log space (sum of natural logs, mean,
/// exponentiate), which stays stable on right-skewed size distributions.
/// Fails with `EmptyDistribution` when the set is empty or any metric value
/// is non-positive, since geometric statistics require strictly positive
/// values.
pub fn summarize(
    particles: &[Particle],
    metric: SizeMetric,
    config: &HistogramConfig,
) -> Result<DistributionSummary> {
    config.validate()?;

    if particles.is_empty() {
        return Err(GranuloError::EmptyDistribution(
            "no particles to summarize".to_string(),
        ));
    }

    let values: Vec<f64> = particles.iter().map(|p| metric.value_of(p)).collect();
    if values.iter().any(|&v| !v.is_finite() || v <= 0.0) {
        return Err(GranuloError::EmptyDistribution(format!(
            "metric {} contains non-positive values",
            metric.label()
        )));
    }

    let n = values.len();
    let n_f = n as f64;

    let arithmetic_mean = values.iter().sum::<f64>() / n_f;
    let std_dev = if n > 1 {
        let ss: f64 = values
            .iter()
            .map(|v| (v - arithmetic_mean) * (v - arithmetic_mean))
            .sum();
        (ss / (n_f - 1.0)).sqrt()
    } else {
        0.0
    };

    let logs: Vec<f64> = values.iter().map(|v| v.ln()).collect();
    let log_mean = logs.iter().sum::<f64>() / n_f;
    let geometric_mean = log_mean.exp();
    let geometric_std_dev = if n > 1 {
        let ss: f64 = logs.iter().map(|l| (l - log_mean) * (l - log_mean)).sum();
        (ss / (n_f - 1.0)).sqrt().exp()
    } else {
        1.0
    };

    let mut sorted = values.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let min = sorted[0];
    let max = sorted[n - 1];

    let percentiles = Percentiles {
        d10: percentile(&sorted, 10.0),
        d25: percentile(&sorted, 25.0),
        d50: percentile(&sorted, 50.0),
        d75: percentile(&sorted, 75.0),
        d90: percentile(&sorted, 90.0),
    };
    let span = if percentiles.d50 > 0.0 {
        (percentiles.d90 - percentiles.d10) / percentiles.d50
    } else {
        0.0
    };

    let bins = config.resolve(n);
    let linear_histogram = build_histogram(&values, min, max, bins);
    let log_histogram = {
        let log_hist = build_histogram(&logs, min.ln(), max.ln(), bins);
        // Report log-bin edges back in metric units
        Histogram {
            edges: log_hist.edges.iter().map(|e| e.exp()).collect(),
            counts: log_hist.counts,
        }
    };

    Ok(DistributionSummary {
        metric,
        count: n,
        arithmetic_mean,
        std_dev,
        min,
        max,
        geometric_mean,
        geometric_std_dev,
        percentiles,
        span,
        linear_histogram,
        log_histogram,
    })
}

/// Percentile of a pre-sorted slice, linearly interpolating between ranks.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = q / 100.0 * (n as f64 - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let weight = rank - lo as f64;
    sorted[lo] * (1.0 - weight) + sorted[hi] * weight
}

/// Equal-width bins over [min, max]; a degenerate range collapses to one bin.
fn build_histogram(values: &[f64], min: f64, max: f64, bins: usize) -> Histogram {
    if max <= min {
        return Histogram {
            edges: vec![min, max.max(min)],
            counts: vec![values.len() as u64],
        };
    }

    let width = (max - min) / bins as f64;
    let edges: Vec<f64> = (0..=bins).map(|i| min + i as f64 * width).collect();
    let mut counts = vec![0u64; bins];
    for &v in values {
        let idx = (((v - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    Histogram { edges, counts }
}

/// Parameters of a lognormal distribution fitted at fixed zero location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LognormalFit {
    /// Standard deviation of the log values (the lognormal shape parameter).
    pub shape: f64,
    /// exp(mean of log values); also the fitted median.
    pub scale: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub median: f64,
    /// Goodness of fit of the theoretical CDF against the empirical CDF.
    pub r_squared: f64,
}

/// Maximum-likelihood lognormal fit (location fixed at zero).
///
/// Particle-size distributions are typically close to lognormal; the fitted
/// parameters are reported alongside the distribution summary.
pub fn fit_lognormal(values: &[f64]) -> Result<LognormalFit> {
    if values.len() < 2 {
        return Err(GranuloError::EmptyDistribution(
            "lognormal fit requires at least two values".to_string(),
        ));
    }
    if values.iter().any(|&v| !v.is_finite() || v <= 0.0) {
        return Err(GranuloError::EmptyDistribution(
            "lognormal fit requires strictly positive values".to_string(),
        ));
    }

    let n = values.len() as f64;
    let logs: Vec<f64> = values.iter().map(|v| v.ln()).collect();
    let mu = logs.iter().sum::<f64>() / n;
    // MLE uses the population variance of the logs
    let sigma = (logs.iter().map(|l| (l - mu) * (l - mu)).sum::<f64>() / n).sqrt();

    let scale = mu.exp();
    let mean = (mu + sigma * sigma / 2.0).exp();
    let variance = (sigma * sigma).exp_m1() * (2.0 * mu + sigma * sigma).exp();

    let r_squared = lognormal_r_squared(values, mu, sigma);

    Ok(LognormalFit {
        shape: sigma,
        scale,
        mean,
        std_dev: variance.sqrt(),
        median: scale,
        r_squared,
    })
}

/// R² of the fitted CDF against the empirical CDF, clipped to [0, 1].
fn lognormal_r_squared(values: &[f64], mu: f64, sigma: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();

    let empirical: Vec<f64> = (1..=n).map(|i| i as f64 / n as f64).collect();
    let theoretical: Vec<f64> = sorted
        .iter()
        .map(|&x| {
            if sigma > 0.0 {
                normal_cdf((x.ln() - mu) / sigma)
            } else {
                // Degenerate fit: step function at the common value
                if x.ln() >= mu {
                    1.0
                } else {
                    0.0
                }
            }
        })
        .collect();

    let emp_mean = empirical.iter().sum::<f64>() / n as f64;
    let ss_res: f64 = empirical
        .iter()
        .zip(&theoretical)
        .map(|(e, t)| (e - t) * (e - t))
        .sum();
    let ss_tot: f64 = empirical.iter().map(|e| (e - emp_mean) * (e - emp_mean)).sum();

    if ss_tot > 0.0 {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Standard normal CDF via the Abramowitz & Stegun erf approximation
/// (7.1.26, max absolute error ~1.5e-7).
fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn particle(id: u32, diameter: f64) -> Particle {
        Particle {
            id,
            pixel_area: 100,
            area_um2: 25.0,
            short_axis_um: diameter,
            long_axis_um: diameter,
            mean_diameter_um: diameter,
            equivalent_diameter_um: diameter,
            circularity: 0.9,
            perimeter_px: 36.0,
        }
    }

    fn particles(diameters: &[f64]) -> Vec<Particle> {
        diameters
            .iter()
            .enumerate()
            .map(|(i, &d)| particle(i as u32 + 1, d))
            .collect()
    }

    #[test]
    fn geometric_statistics_in_log_space() {
        let set = particles(&[1.0, 2.0, 4.0, 8.0]);
        let summary = summarize(
            &set,
            SizeMetric::EquivalentDiameter,
            &HistogramConfig::default(),
        )
        .unwrap();

        // exp(mean(ln)) = 2^1.5
        assert_approx_eq!(summary.geometric_mean, 2.0f64.powf(1.5), 1e-12);
        // exp(sample std of ln values) = exp(ln2 * sqrt(5/3))
        let expected_gsd = (2.0f64.ln() * (5.0f64 / 3.0).sqrt()).exp();
        assert_approx_eq!(summary.geometric_std_dev, expected_gsd, 1e-12);
        assert_approx_eq!(summary.arithmetic_mean, 3.75);
        assert_eq!(summary.count, 4);
    }

    #[test]
    fn empty_set_is_an_error() {
        let result = summarize(
            &[],
            SizeMetric::EquivalentDiameter,
            &HistogramConfig::default(),
        );
        assert!(matches!(result, Err(GranuloError::EmptyDistribution(_))));
    }

    #[test]
    fn nonpositive_values_are_an_error() {
        let set = particles(&[1.0, 0.0, 2.0]);
        let result = summarize(
            &set,
            SizeMetric::EquivalentDiameter,
            &HistogramConfig::default(),
        );
        assert!(matches!(result, Err(GranuloError::EmptyDistribution(_))));
    }

    #[test]
    fn zero_bin_count_is_an_error() {
        let set = particles(&[1.0, 2.0]);
        let result = summarize(
            &set,
            SizeMetric::EquivalentDiameter,
            &HistogramConfig { bins: Some(0) },
        );
        assert!(matches!(result, Err(GranuloError::InvalidParameter(_))));
    }

    #[test]
    fn percentiles_interpolate_linearly() {
        let set = particles(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let summary = summarize(
            &set,
            SizeMetric::EquivalentDiameter,
            &HistogramConfig::default(),
        )
        .unwrap();
        assert_approx_eq!(summary.percentiles.d50, 3.0);
        assert_approx_eq!(summary.percentiles.d10, 1.4);
        assert_approx_eq!(summary.percentiles.d90, 4.6);
        assert_approx_eq!(summary.span, (4.6 - 1.4) / 3.0, 1e-12);
    }

    #[test]
    fn histograms_cover_the_range() {
        let set = particles(&[1.0, 2.0, 4.0, 8.0]);
        let summary = summarize(
            &set,
            SizeMetric::EquivalentDiameter,
            &HistogramConfig { bins: Some(4) },
        )
        .unwrap();

        let lin = &summary.linear_histogram;
        assert_eq!(lin.counts.len(), 4);
        assert_eq!(lin.edges.len(), 5);
        assert_approx_eq!(lin.edges[0], 1.0);
        assert_approx_eq!(lin.edges[4], 8.0);
        assert_eq!(lin.counts.iter().sum::<u64>(), 4);

        // Log bins of [1, 2, 4, 8] are equal-width in log space: one value each,
        // except the shared max edge
        let log = &summary.log_histogram;
        assert_eq!(log.counts.len(), 4);
        assert_approx_eq!(log.edges[0], 1.0, 1e-12);
        assert_approx_eq!(log.edges[1], 2.0f64.powf(0.75), 1e-12);
        assert_approx_eq!(log.edges[4], 8.0, 1e-9);
        assert_eq!(log.counts.iter().sum::<u64>(), 4);
    }

    #[test]
    fn single_particle_summary() {
        let set = particles(&[5.0]);
        let summary = summarize(
            &set,
            SizeMetric::EquivalentDiameter,
            &HistogramConfig::default(),
        )
        .unwrap();
        assert_eq!(summary.count, 1);
        assert_approx_eq!(summary.std_dev, 0.0);
        assert_approx_eq!(summary.geometric_std_dev, 1.0);
        assert_approx_eq!(summary.percentiles.d50, 5.0);
        assert_eq!(summary.linear_histogram.counts, vec![1]);
    }

    #[test]
    fn metric_selection_drives_summary() {
        let mut set = particles(&[2.0, 2.0]);
        set[0].long_axis_um = 10.0;
        set[1].long_axis_um = 10.0;
        let summary = summarize(&set, SizeMetric::LongAxis, &HistogramConfig::default()).unwrap();
        assert_approx_eq!(summary.arithmetic_mean, 10.0);
    }

    #[test]
    fn lognormal_fit_recovers_parameters() {
        // Exact lognormal quantiles: ln(x) symmetric around ln(3)
        let values = [3.0f64 / 4.0, 3.0 / 2.0, 3.0, 6.0, 12.0];
        let fit = fit_lognormal(&values).unwrap();
        assert_approx_eq!(fit.median, 3.0, 1e-9);
        assert_approx_eq!(fit.scale, 3.0, 1e-9);
        // Population std of ln values: ln2 * sqrt(2)
        assert_approx_eq!(fit.shape, 2.0f64.ln() * 2.0f64.sqrt(), 1e-9);
        assert!(fit.r_squared > 0.8);
        assert!(fit.mean > fit.median);
    }

    #[test]
    fn lognormal_fit_needs_two_positive_values() {
        assert!(fit_lognormal(&[1.0]).is_err());
        assert!(fit_lognormal(&[1.0, -2.0]).is_err());
    }
}
