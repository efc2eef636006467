//! Statistical utility functions shared across modules

use std::cmp::Ordering;

/// Consistency constant that makes the MAD estimate the normal SD
const MAD_SCALE: f64 = 1.4826;

fn sort_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

/// Median of the finite values; NaN when there are none
pub fn median(values: &[f64]) -> f64 {
    let sorted = sort_finite(values);
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Squared median absolute deviation, scaled to the normal SD
pub fn mad_squared(values: &[f64]) -> f64 {
    let center = median(values);
    let deviations: Vec<f64> = values
        .iter()
        .filter(|v| v.is_finite())
        .map(|v| (v - center).abs())
        .collect();
    let mad = median(&deviations) * MAD_SCALE;
    mad * mad
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance with denominator n - 1
pub fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n as f64 - 1.0)
}

/// Mean after dropping `trim` of the observations from each end
pub fn trimmed_mean(values: &[f64], trim: f64) -> f64 {
    let sorted = sort_finite(values);
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    let lo = (n as f64 * trim).floor() as usize;
    let hi = n - lo;
    if lo >= hi {
        return median(&sorted);
    }
    mean(&sorted[lo..hi])
}

/// Quantile of an already sorted slice, interpolating linearly between order
/// statistics (type 7)
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    let h = (n as f64 - 1.0) * p.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi.min(n - 1)] - sorted[lo])
}

/// Trigamma function, the derivative of digamma
pub fn trigamma(x: f64) -> f64 {
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).powi(2) - trigamma(1.0 - x);
    }
    let mut result = 0.0;
    let mut z = x;
    while z < 8.0 {
        result += 1.0 / (z * z);
        z += 1.0;
    }
    let z2 = z * z;
    result + 1.0 / z + 0.5 / z2 + 1.0 / (6.0 * z2 * z) - 1.0 / (30.0 * z2 * z2 * z)
        + 1.0 / (42.0 * z2 * z2 * z2 * z)
}

/// Locally weighted linear smoother (Cleveland's lowess).
///
/// `x` must be sorted ascending. `f` is the span as a fraction of the points and
/// `iterations` the number of robustifying passes.
pub fn lowess(x: &[f64], y: &[f64], f: f64, iterations: usize) -> Vec<f64> {
    let n = x.len();
    if n < 2 {
        return y.to_vec();
    }
    let ns = ((f * n as f64).round() as usize).clamp(2, n);
    let mut robustness = vec![1.0; n];
    let mut fitted = vec![0.0; n];

    for pass in 0..=iterations {
        let mut left = 0;
        for i in 0..n {
            // slide the window of ns nearest neighbours
            while left + ns < n && x[i] - x[left] > x[left + ns] - x[i] {
                left += 1;
            }
            let right = left + ns - 1;
            fitted[i] = local_linear_fit(x, y, &robustness, i, left, right);
        }

        if pass == iterations {
            break;
        }
        let residuals: Vec<f64> = (0..n).map(|i| (y[i] - fitted[i]).abs()).collect();
        let scale = 6.0 * median(&residuals);
        if scale <= 1e-7 * mean(&residuals) {
            break;
        }
        for (w, r) in robustness.iter_mut().zip(residuals.iter()) {
            let u = r / scale;
            *w = if u < 1.0 { (1.0 - u * u).powi(2) } else { 0.0 };
        }
    }
    fitted
}

fn local_linear_fit(x: &[f64], y: &[f64], robustness: &[f64], i: usize, left: usize, right: usize) -> f64 {
    let h = (x[i] - x[left]).max(x[right] - x[i]);
    let mut weights = vec![0.0; right - left + 1];
    let mut total = 0.0;
    for (k, j) in (left..=right).enumerate() {
        let d = (x[j] - x[i]).abs();
        let w = if h <= 0.0 {
            1.0
        } else if d <= 0.999 * h {
            if d <= 0.001 * h {
                1.0
            } else {
                (1.0 - (d / h).powi(3)).powi(3)
            }
        } else {
            0.0
        };
        weights[k] = w * robustness[j];
        total += weights[k];
    }
    if total <= 0.0 {
        return y[i];
    }

    let xbar: f64 = (left..=right).zip(&weights).map(|(j, w)| w * x[j]).sum::<f64>() / total;
    let ybar: f64 = (left..=right).zip(&weights).map(|(j, w)| w * y[j]).sum::<f64>() / total;
    let sxx: f64 = (left..=right)
        .zip(&weights)
        .map(|(j, w)| w * (x[j] - xbar).powi(2))
        .sum();
    let range = x[x.len() - 1] - x[0];
    if sxx.sqrt() > 0.001 * range {
        let sxy: f64 = (left..=right)
            .zip(&weights)
            .map(|(j, w)| w * (x[j] - xbar) * (y[j] - ybar))
            .sum();
        ybar + sxy / sxx * (x[i] - xbar)
    } else {
        ybar
    }
}
