//! Descriptive statistics over pixel samples.
//!
//! All functions accept empty input and return `0.0` rather than NaN.

use image::GrayImage;

/// Guards divisions that would otherwise blow up on flat or empty inputs.
pub const EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    pub fn variance(&self) -> f64 {
        self.std * self.std
    }
}

/// Mean, population standard deviation and extrema in a single pass.
pub fn summarize<I>(values: I) -> Summary
where
    I: IntoIterator<Item = f64>,
{
    let mut count = 0usize;
    let mut mean = 0.0;
    let mut m2 = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for value in values {
        count += 1;
        let delta = value - mean;
        mean += delta / count as f64;
        m2 += delta * (value - mean);
        min = min.min(value);
        max = max.max(value);
    }

    if count == 0 {
        return Summary::default();
    }

    Summary {
        count,
        mean,
        std: (m2 / count as f64).max(0.0).sqrt(),
        min,
        max,
    }
}

pub fn mean(values: &[f64]) -> f64 {
    summarize(values.iter().copied()).mean
}

pub fn std_dev(values: &[f64]) -> f64 {
    summarize(values.iter().copied()).std
}

/// Percentile with linear interpolation between closest ranks.
/// `sorted` must be in ascending order.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Standardized third and fourth moments (kurtosis is not excess-adjusted).
pub fn skewness_kurtosis(values: &[f64]) -> (f64, f64) {
    let summary = summarize(values.iter().copied());
    if summary.count == 0 {
        return (0.0, 0.0);
    }
    let denom = summary.std + EPSILON;
    let (mut m3, mut m4) = (0.0, 0.0);
    for value in values {
        let z = (value - summary.mean) / denom;
        let z2 = z * z;
        m3 += z2 * z;
        m4 += z2 * z2;
    }
    let n = summary.count as f64;
    (m3 / n, m4 / n)
}

/// Histogram of `values` with `bins` equal-width bins over `[lo, hi)`.
/// Values outside the range are dropped, except `hi` itself which lands in the last bin.
pub fn histogram<I>(values: I, bins: usize, lo: f64, hi: f64) -> Vec<u64>
where
    I: IntoIterator<Item = f64>,
{
    let mut counts = vec![0u64; bins];
    if bins == 0 || hi <= lo {
        return counts;
    }
    let width = (hi - lo) / bins as f64;
    for value in values {
        if value < lo || value > hi || value.is_nan() {
            continue;
        }
        let index = (((value - lo) / width) as usize).min(bins - 1);
        counts[index] += 1;
    }
    counts
}

pub fn normalize(counts: &[u64]) -> Vec<f64> {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return vec![0.0; counts.len()];
    }
    counts.iter().map(|&c| c as f64 / total as f64).collect()
}

/// Shannon entropy in bits of a probability vector, with `EPSILON` inside the log.
pub fn entropy(probabilities: &[f64]) -> f64 {
    -probabilities
        .iter()
        .map(|&p| p * (p + EPSILON).log2())
        .sum::<f64>()
}

/// Entropy of a smoothed histogram: every bin gets `EPSILON` added before normalizing.
pub fn smoothed_entropy(counts: &[u64]) -> f64 {
    let total: f64 = counts.iter().map(|&c| c as f64 + EPSILON).sum();
    -counts
        .iter()
        .map(|&c| {
            let p = (c as f64 + EPSILON) / total;
            p * p.log2()
        })
        .sum::<f64>()
}

pub fn gray_values(image: &GrayImage) -> impl Iterator<Item = f64> + '_ {
    image.as_raw().iter().map(|&v| v as f64)
}

pub fn gray_summary(image: &GrayImage) -> Summary {
    summarize(gray_values(image))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_population_std() {
        let summary = summarize([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(summary.count, 8);
        assert!((summary.mean - 5.0).abs() < 1e-12);
        assert!((summary.std - 2.0).abs() < 1e-12);
        assert_eq!(summary.range(), 7.0);
    }

    #[test]
    fn test_empty_inputs_are_zero() {
        assert_eq!(summarize(std::iter::empty()), Summary::default());
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(skewness_kurtosis(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!((percentile(&sorted, 50.0) - 2.5).abs() < 1e-12);
        assert!((percentile(&sorted, 25.0) - 1.75).abs() < 1e-12);
        assert_eq!(percentile(&sorted, 100.0), 4.0);
    }

    #[test]
    fn test_histogram_and_entropy() {
        let counts = histogram([0.0, 63.0, 64.0, 255.0, 256.0], 4, 0.0, 256.0);
        assert_eq!(counts, vec![2, 1, 0, 2]);

        let uniform = normalize(&[1, 1, 1, 1]);
        assert!((entropy(&uniform) - 2.0).abs() < 1e-6);
        assert!(smoothed_entropy(&[10, 0, 0, 0]).abs() < 1e-6);
    }
}
