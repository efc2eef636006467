//! Dispersion trend fitting

use ndarray::Array1;

use super::DispersionParams;
use crate::data::DESeqDataSet;
use crate::error::{ReportError, Result};
use crate::stats::trimmed_mean;

/// Method for fitting the dispersion-mean trend
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrendFitMethod {
    /// `dispersion = a0 + a1 / mean`, falling back to `Mean` when it fails
    Parametric,
    /// A constant: the trimmed mean of the gene-wise dispersions
    Mean,
}

/// Fit a trend to the gene-wise dispersions as a function of mean normalized
/// count, storing the trended values and the `(a0, a1)` coefficients
pub fn fit_dispersion_trend(
    dds: &mut DESeqDataSet,
    method: TrendFitMethod,
    params: &DispersionParams,
) -> Result<()> {
    let gene_dispersions = dds.gene_dispersions().ok_or_else(|| ReportError::TrendFittingFailed {
        reason: "gene-wise dispersions must be estimated first".to_string(),
    })?;
    let normalized = dds.normalized_counts().ok_or_else(|| ReportError::TrendFittingFailed {
        reason: "normalized counts are required for trend fitting".to_string(),
    })?;

    let means: Vec<f64> = normalized.rows().into_iter().map(|row| row.mean().unwrap_or(0.0)).collect();
    let dispersions = gene_dispersions.to_vec();

    let (a0, a1) = match method {
        TrendFitMethod::Parametric => match parametric_dispersion_fit(&means, &dispersions, params.min_disp) {
            Ok(coefs) => coefs,
            Err(e) => {
                log::warn!("{}; using the mean dispersion as the trend", e);
                (mean_dispersion(&dispersions, params.min_disp)?, 0.0)
            }
        },
        TrendFitMethod::Mean => (mean_dispersion(&dispersions, params.min_disp)?, 0.0),
    };
    log::info!("Dispersion trend: {:.6} + {:.6} / mean", a0, a1);

    let trended: Array1<f64> = means
        .iter()
        .map(|&m| if m > 0.0 { a0 + a1 / m } else { f64::NAN })
        .collect();
    dds.set_dispersion_function(a0, a1);
    dds.set_trended_dispersions(trended)
}

/// 0.001-trimmed mean of the dispersions above `100 * min_disp`
pub fn mean_dispersion(dispersions: &[f64], min_disp: f64) -> Result<f64> {
    let usable: Vec<f64> = dispersions
        .iter()
        .copied()
        .filter(|d| d.is_finite() && *d > 100.0 * min_disp)
        .collect();
    if usable.is_empty() {
        return Err(ReportError::TrendFittingFailed {
            reason: "all gene-wise dispersions are at the lower bound".to_string(),
        });
    }
    Ok(trimmed_mean(&usable, 0.001))
}

/// Fit `a0 + a1 / mean` with a Gamma-family GLM (identity link), iteratively
/// dropping genes whose dispersion is outside `(1e-4, 15)` times the fit
pub fn parametric_dispersion_fit(means: &[f64], dispersions: &[f64], min_disp: f64) -> Result<(f64, f64)> {
    const MAX_ITER: usize = 10;

    let data: Vec<(f64, f64)> = means
        .iter()
        .zip(dispersions.iter())
        .filter(|(&m, &d)| m > 0.0 && d.is_finite() && d > 100.0 * min_disp)
        .map(|(&m, &d)| (m, d))
        .collect();

    let mut coefs = (0.1, 1.0);
    for iter in 0..MAX_ITER {
        let (a0, a1) = coefs;
        let good: Vec<(f64, f64)> = data
            .iter()
            .copied()
            .filter(|&(m, d)| {
                let ratio = d / (a0 + a1 / m);
                ratio > 1e-4 && ratio < 15.0
            })
            .collect();
        if good.len() < 3 {
            return Err(ReportError::TrendFittingFailed {
                reason: "too few genes for a parametric dispersion fit".to_string(),
            });
        }

        let (new_coefs, glm_converged) = fit_gamma_identity(&good, coefs);
        if new_coefs.0 <= 0.0 || new_coefs.1 <= 0.0 || !new_coefs.0.is_finite() || !new_coefs.1.is_finite() {
            return Err(ReportError::TrendFittingFailed {
                reason: format!(
                    "parametric dispersion fit has non-positive coefficients ({:.4}, {:.4})",
                    new_coefs.0, new_coefs.1
                ),
            });
        }

        let change = (new_coefs.0 / a0).ln().powi(2) + (new_coefs.1 / a1).ln().powi(2);
        coefs = new_coefs;
        log::debug!(
            "Parametric trend iteration {}: {} genes, a0 = {:.6}, a1 = {:.6}",
            iter + 1,
            good.len(),
            coefs.0,
            coefs.1
        );
        if change < 1e-6 && glm_converged {
            return Ok(coefs);
        }
    }

    Err(ReportError::TrendFittingFailed {
        reason: "parametric dispersion fit did not converge".to_string(),
    })
}

fn gamma_deviance(data: &[(f64, f64)], a0: f64, a1: f64) -> f64 {
    data.iter()
        .map(|&(m, d)| {
            let mu = (a0 + a1 / m).max(1e-8);
            2.0 * (-(d / mu).ln() + (d - mu) / mu)
        })
        .sum()
}

/// IRLS for `d ~ 1 + I(1/mean)` with Gamma weights `1 / mu^2`
fn fit_gamma_identity(data: &[(f64, f64)], start: (f64, f64)) -> ((f64, f64), bool) {
    let (mut a0, mut a1) = start;
    let mut dev_old = gamma_deviance(data, a0, a1);

    for _ in 0..25 {
        let (mut sw, mut swx, mut swy, mut swxx, mut swxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for &(m, d) in data {
            let x = 1.0 / m;
            let mu = (a0 + a1 * x).max(1e-8);
            let w = 1.0 / (mu * mu);
            sw += w;
            swx += w * x;
            swy += w * d;
            swxx += w * x * x;
            swxy += w * x * d;
        }
        let det = sw * swxx - swx * swx;
        if det.abs() < 1e-12 {
            return ((a0, a1), false);
        }
        a0 = (swxx * swy - swx * swxy) / det;
        a1 = (sw * swxy - swx * swy) / det;

        let dev = gamma_deviance(data, a0, a1);
        if (dev_old - dev).abs() / (0.1 + dev.abs()) < 1e-8 {
            return ((a0, a1), true);
        }
        dev_old = dev;
    }
    ((a0, a1), false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gamma_glm_identity() {
        let data: Vec<(f64, f64)> = (1..50)
            .map(|i| {
                let m = i as f64 * 20.0 + 100.0;
                (m, 0.1 + 10.0 / m)
            })
            .collect();
        let ((a0, a1), converged) = fit_gamma_identity(&data, (0.1, 1.0));
        assert!(converged);
        assert!((a0 - 0.1).abs() < 1e-6);
        assert!((a1 - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_parametric_fit_recovers_curve() {
        let means: Vec<f64> = (1..200).map(|i| i as f64 * 5.0).collect();
        let disps: Vec<f64> = means
            .iter()
            .enumerate()
            .map(|(i, &m)| (0.05 + 2.0 / m) * if i % 2 == 0 { 1.2 } else { 1.0 / 1.2 })
            .collect();
        let (a0, a1) = parametric_dispersion_fit(&means, &disps, 1e-8).unwrap();
        assert!((a0 - 0.05).abs() < 0.01, "a0 = {}", a0);
        assert!((a1 - 2.0).abs() < 0.5, "a1 = {}", a1);
    }

    #[test]
    fn test_parametric_fit_rejects_flat_decreasing() {
        // dispersion rising with the mean gives a negative a1
        let means: Vec<f64> = (1..100).map(|i| i as f64).collect();
        let disps: Vec<f64> = means.iter().map(|m| 0.01 * m).collect();
        assert!(parametric_dispersion_fit(&means, &disps, 1e-8).is_err());
    }

    #[test]
    fn test_mean_dispersion_ignores_floor_values() {
        let disps = [1e-8, 0.1, 0.2, 0.3, f64::NAN];
        assert!((mean_dispersion(&disps, 1e-8).unwrap() - 0.2).abs() < 1e-12);
        assert!(mean_dispersion(&[1e-8, 1e-7], 1e-8).is_err());
    }
}
