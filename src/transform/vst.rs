//! Variance stabilizing transformation (VST)
//!
//! Maps normalized counts to an approximately homoskedastic log2-like scale
//! using the closed form implied by the fitted dispersion-mean trend.

use ndarray::{Array2, Axis};

use crate::data::DESeqDataSet;
use crate::dispersion::{estimate_gene_dispersions, fit_dispersion_trend, DispersionParams, TrendFitMethod};
use crate::error::{ReportError, Result};

/// Genes used for the blind trend fit when enough are well expressed
const N_SUBSAMPLE: usize = 1000;
/// Mean normalized count a gene needs to enter the subsample
const MIN_SUBSAMPLE_MEAN: f64 = 5.0;

/// Closed form used for the transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VstMethod {
    /// `log2((1 + a1 + 2 a0 q + 2 sqrt(a0 q (1 + a1 + a0 q))) / (4 a0))`
    Parametric,
    /// `(2 asinh(sqrt(a0 q)) - ln a0 - ln 4) / ln 2`
    Mean,
}

/// Transformed matrix (genes x samples) with the trend that produced it
#[derive(Debug, Clone)]
pub struct VstResult {
    pub data: Array2<f64>,
    pub gene_ids: Vec<String>,
    pub sample_ids: Vec<String>,
    pub method: VstMethod,
    /// Asymptotic dispersion `a0`
    pub asympt_disp: f64,
    /// Extra-Poisson term `a1`
    pub extra_pois: f64,
}

impl VstResult {
    pub fn n_genes(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }
}

/// Blind VST: the trend is re-estimated with the intercept-only design and the
/// size factors of `dds`.
///
/// When at least 1000 genes have a mean normalized count above 5, the trend is
/// fitted on 1000 of them spaced evenly by mean rank. A failed parametric fit
/// falls back to the mean dispersion and the `Mean` closed form.
pub fn vst(dds: &DESeqDataSet) -> Result<VstResult> {
    let size_factors = dds.size_factors().ok_or_else(|| ReportError::InvalidInput {
        reason: "size factors must be estimated before VST".to_string(),
    })?;
    let normalized = dds.normalized_counts().ok_or_else(|| ReportError::InvalidInput {
        reason: "normalized counts are required for VST".to_string(),
    })?;
    let base_means: Vec<f64> = normalized
        .mean_axis(Axis(1))
        .map(|m| m.to_vec())
        .unwrap_or_default();

    let subset = subsample_genes(&base_means);
    let counts = match &subset {
        Some(indices) => {
            log::info!("VST: fitting the dispersion trend on {} subsampled genes", indices.len());
            dds.counts().select_genes(indices)?
        }
        None => dds.counts().clone(),
    };

    let mut blind = DESeqDataSet::intercept_only(counts)?;
    blind.set_size_factors(size_factors.clone())?;
    let params = DispersionParams::default();
    estimate_gene_dispersions(&mut blind, &params)?;
    fit_dispersion_trend(&mut blind, TrendFitMethod::Parametric, &params)?;
    let (asympt_disp, extra_pois) = blind.dispersion_function().ok_or_else(|| ReportError::TrendFittingFailed {
        reason: "no dispersion trend for VST".to_string(),
    })?;

    let method = if extra_pois > 0.0 { VstMethod::Parametric } else { VstMethod::Mean };
    log::info!(
        "VST ({:?}): asymptotic dispersion {:.5}, extra-Poisson {:.5}",
        method,
        asympt_disp,
        extra_pois
    );

    Ok(VstResult {
        data: transform(normalized, method, asympt_disp, extra_pois),
        gene_ids: dds.counts().gene_ids().to_vec(),
        sample_ids: dds.counts().sample_ids().to_vec(),
        method,
        asympt_disp,
        extra_pois,
    })
}

/// Indices of `N_SUBSAMPLE` genes with mean above the cutoff, evenly spaced by
/// rank of the mean; `None` when too few genes qualify
fn subsample_genes(base_means: &[f64]) -> Option<Vec<usize>> {
    let mut candidates: Vec<usize> = (0..base_means.len())
        .filter(|&i| base_means[i] > MIN_SUBSAMPLE_MEAN)
        .collect();
    if candidates.len() < N_SUBSAMPLE {
        return None;
    }
    candidates.sort_by(|&a, &b| base_means[a].total_cmp(&base_means[b]));

    let last = (candidates.len() - 1) as f64;
    let mut picked: Vec<usize> = (0..N_SUBSAMPLE)
        .map(|k| {
            let pos = (k as f64 * last / (N_SUBSAMPLE - 1) as f64).round() as usize;
            candidates[pos]
        })
        .collect();
    picked.sort_unstable();
    picked.dedup();
    Some(picked)
}

fn transform(normalized: &Array2<f64>, method: VstMethod, a0: f64, a1: f64) -> Array2<f64> {
    normalized.mapv(|q| match method {
        VstMethod::Parametric => vst_parametric_single(q, a0, a1),
        VstMethod::Mean => vst_mean_single(q, a0),
    })
}

fn vst_parametric_single(q: f64, a0: f64, a1: f64) -> f64 {
    let q = q.max(0.0);
    let numerator = 1.0 + a1 + 2.0 * a0 * q + 2.0 * (a0 * q * (1.0 + a1 + a0 * q)).sqrt();
    (numerator / (4.0 * a0)).log2()
}

fn vst_mean_single(q: f64, a0: f64) -> f64 {
    let q = q.max(0.0);
    (2.0 * (a0 * q).sqrt().asinh() - a0.ln() - 4.0_f64.ln()) / std::f64::consts::LN_2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CountMatrix;
    use crate::normalization::{estimate_size_factors, SizeFactorMethod};

    #[test]
    fn test_vst_parametric_single() {
        // large counts approach log2(q)
        let v = vst_parametric_single(10_000.0, 0.05, 1.0);
        assert!((v - 10_000f64.log2()).abs() < 0.1, "{}", v);
        assert!(vst_parametric_single(0.0, 0.1, 0.5).is_finite());
    }

    #[test]
    fn test_vst_mean_single() {
        let v = vst_mean_single(10_000.0, 0.05);
        assert!((v - 10_000f64.log2()).abs() < 0.1, "{}", v);
        // asinh(0) = 0
        let zero = vst_mean_single(0.0, 0.1);
        assert!((zero - (-(0.1f64.ln()) - 4f64.ln()) / std::f64::consts::LN_2).abs() < 1e-12);
    }

    #[test]
    fn test_vst_monotone() {
        for &(a0, a1) in &[(0.05, 2.0), (0.3, 0.5)] {
            let mut previous = f64::NEG_INFINITY;
            for q in [0.0, 0.5, 1.0, 10.0, 100.0, 1000.0] {
                let v = vst_parametric_single(q, a0, a1);
                assert!(v > previous);
                previous = v;
            }
        }
    }

    #[test]
    fn test_subsample_evenly_spaced() {
        assert!(subsample_genes(&vec![10.0; 999]).is_none());

        let means: Vec<f64> = (0..3000).map(|i| i as f64).collect();
        let picked = subsample_genes(&means).unwrap();
        assert_eq!(picked.len(), N_SUBSAMPLE);
        assert_eq!(picked[0], 6);
        assert_eq!(*picked.last().unwrap(), 2999);
    }

    #[test]
    fn test_vst_dataset() {
        let counts = Array2::from_shape_fn((30, 6), |(i, j)| {
            let base = 5.0 + 25.0 * i as f64;
            (base * [0.8, 1.0, 1.3, 0.9, 1.2, 1.1][(i * 7 + j) % 6]).round()
        });
        let genes = (0..30).map(|i| format!("g{}", i)).collect();
        let samples = (0..6).map(|j| format!("s{}", j)).collect();
        let counts = CountMatrix::new(counts, genes, samples).unwrap();
        let mut dds = DESeqDataSet::intercept_only(counts).unwrap();
        estimate_size_factors(&mut dds, SizeFactorMethod::Ratio).unwrap();

        let result = vst(&dds).unwrap();
        assert_eq!(result.data.dim(), (30, 6));
        assert!(result.data.iter().all(|v| v.is_finite()));
        assert!(result.asympt_disp > 0.0);
        // rank order of a sample follows the counts
        assert!(result.data[[29, 0]] > result.data[[0, 0]]);
    }
}
