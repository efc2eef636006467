//! Cook's distance outlier filtering
//!
//! `D_ij = r_ij^2 / p * h_ij / (1 - h_ij)^2`, where `r_ij` is the Pearson
//! residual under a robust method-of-moments dispersion and `h_ij` the hat
//! diagonal of the GLM fit.

use std::collections::BTreeMap;

use ndarray::Array2;
use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::data::DESeqDataSet;
use crate::error::{ReportError, Result};
use crate::io::DESeqResults;
use crate::stats::trimmed_mean;

/// Levels need this many replicates before their samples can flag a gene
pub const MIN_REPLICATES_FOR_COOKS: usize = 3;

/// Floor of the robust dispersion used for the Pearson residuals
const MIN_ROBUST_DISP: f64 = 0.04;

/// Cook's distances (genes x samples)
pub fn cooks_distances(dds: &DESeqDataSet) -> Result<Array2<f64>> {
    let mu = dds.fitted_mu().ok_or_else(|| ReportError::InvalidInput {
        reason: "the GLM must be fitted before computing Cook's distances".to_string(),
    })?;
    let hat = dds.hat_diagonals().ok_or_else(|| ReportError::InvalidInput {
        reason: "hat diagonals are missing from the GLM fit".to_string(),
    })?;
    let p = dds.design_info().n_coefs() as f64;
    let dispersions = robust_moments_dispersion(dds)?;
    let counts = dds.counts().counts();
    let n_samples = dds.n_samples();

    let rows: Vec<Vec<f64>> = (0..dds.n_genes())
        .into_par_iter()
        .map(|i| {
            let alpha = dispersions[i];
            (0..n_samples)
                .map(|j| {
                    let m = mu[[i, j]];
                    let h = hat[[i, j]];
                    let v = m + alpha * m * m;
                    if !(v > 0.0) || !h.is_finite() || h >= 1.0 {
                        return f64::NAN;
                    }
                    let pearson_sq = (counts[[i, j]] - m).powi(2) / v;
                    pearson_sq / p * h / (1.0 - h).powi(2)
                })
                .collect()
        })
        .collect();

    let mut cooks = Array2::from_elem((dds.n_genes(), n_samples), f64::NAN);
    for (i, row) in rows.iter().enumerate() {
        for (j, &d) in row.iter().enumerate() {
            cooks[[i, j]] = d;
        }
    }
    Ok(cooks)
}

/// Samples of each condition level, in level order
fn level_groups(dds: &DESeqDataSet) -> BTreeMap<String, Vec<usize>> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    let column = dds
        .design_info()
        .variable
        .as_deref()
        .and_then(|v| dds.sample_metadata().column(v));
    match column {
        Some(values) => {
            for (j, level) in values.iter().enumerate() {
                groups.entry(level.clone()).or_default().push(j);
            }
        }
        None => {
            groups.insert(String::new(), (0..dds.n_samples()).collect());
        }
    }
    groups
}

/// `(var - mean) / mean^2` with a trimmed variance: the largest trimmed
/// within-level variance when some level has three or more replicates, the
/// trimmed variance over all samples otherwise
pub fn robust_moments_dispersion(dds: &DESeqDataSet) -> Result<Vec<f64>> {
    let normalized = dds.normalized_counts().ok_or_else(|| ReportError::InvalidInput {
        reason: "size factors must be estimated first".to_string(),
    })?;
    let groups: Vec<Vec<usize>> = level_groups(dds)
        .into_values()
        .filter(|g| g.len() >= MIN_REPLICATES_FOR_COOKS)
        .collect();
    let all: Vec<usize> = (0..dds.n_samples()).collect();

    Ok(normalized
        .rows()
        .into_iter()
        .map(|row| {
            let values = row.to_vec();
            let variance = if groups.is_empty() {
                trimmed_variance(&all.iter().map(|&j| values[j]).collect::<Vec<_>>(), 1.0 / 8.0, 1.51)
            } else {
                groups
                    .iter()
                    .map(|g| {
                        let cell: Vec<f64> = g.iter().map(|&j| values[j]).collect();
                        let (trim, scale) = match cell.len() {
                            0..=3 => (1.0 / 3.0, 2.04),
                            4..=23 => (1.0 / 4.0, 1.86),
                            _ => (1.0 / 8.0, 1.51),
                        };
                        trimmed_variance(&cell, trim, scale)
                    })
                    .fold(0.0, f64::max)
            };
            let mean = row.mean().unwrap_or(0.0);
            if mean > 0.0 {
                ((variance - mean) / (mean * mean)).max(MIN_ROBUST_DISP)
            } else {
                MIN_ROBUST_DISP
            }
        })
        .collect())
}

fn trimmed_variance(values: &[f64], trim: f64, scale: f64) -> f64 {
    let center = trimmed_mean(values, trim);
    let sq: Vec<f64> = values.iter().map(|v| (v - center).powi(2)).collect();
    scale * trimmed_mean(&sq, trim)
}

/// 99% quantile of `F(p, m - p)`; infinite when there are no residual degrees of freedom
pub fn cooks_cutoff(n_samples: usize, n_coefs: usize) -> f64 {
    if n_samples <= n_coefs {
        return f64::INFINITY;
    }
    match FisherSnedecor::new(n_coefs as f64, (n_samples - n_coefs) as f64) {
        Ok(f) => f.inverse_cdf(0.99),
        Err(_) => f64::INFINITY,
    }
}

/// Per-gene maximum Cook's distance over samples in levels with enough
/// replicates. NaN for every gene when no level qualifies.
pub fn max_cooks_per_gene(dds: &DESeqDataSet, cooks: &Array2<f64>) -> Vec<f64> {
    let eligible: Vec<usize> = level_groups(dds)
        .into_values()
        .filter(|g| g.len() >= MIN_REPLICATES_FOR_COOKS)
        .flatten()
        .collect();
    if eligible.is_empty() {
        log::debug!("No level has {} replicates; Cook's filtering skipped", MIN_REPLICATES_FOR_COOKS);
    }

    cooks
        .rows()
        .into_iter()
        .map(|row| {
            eligible
                .iter()
                .map(|&j| row[j])
                .filter(|d| d.is_finite())
                .fold(f64::NAN, f64::max)
        })
        .collect()
}

/// Set p-values of genes whose maximum Cook's distance exceeds `cutoff` to NaN
/// and flag them.
///
/// For two-level designs a gene is kept when three or more samples have a
/// count above the outlying sample's count, i.e. the outlier is a low value.
pub fn filter_by_cooks(dds: &DESeqDataSet, results: &mut DESeqResults, cooks: &Array2<f64>, cutoff: f64) -> usize {
    let max_cooks = max_cooks_per_gene(dds, cooks);
    let two_levels = dds.design_info().levels.len() == 2;
    let counts = dds.counts().counts();
    let mut flagged = 0;

    for (i, &max) in max_cooks.iter().enumerate() {
        results.max_cooks[i] = max;
        if !(max > cutoff) {
            continue;
        }
        if two_levels {
            let row = cooks.row(i);
            let outlier_sample = (0..row.len())
                .filter(|&j| row[j].is_finite())
                .max_by(|&a, &b| row[a].total_cmp(&row[b]));
            if let Some(j) = outlier_sample {
                let above = counts.row(i).iter().filter(|&&c| c > counts[[i, j]]).count();
                if above >= 3 {
                    continue;
                }
            }
        }
        results.pvalues[i] = f64::NAN;
        results.cooks_outliers[i] = true;
        flagged += 1;
    }

    log::info!("Cook's distance cutoff {:.3}: {} genes flagged as outliers", cutoff, flagged);
    flagged
}
