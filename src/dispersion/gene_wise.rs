//! Gene-wise dispersion estimation using Cox-Reid adjusted profile likelihood

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;

use super::{grid_search, line_search, max_dispersion, DispersionParams, DispersionProblem};
use crate::data::DESeqDataSet;
use crate::error::{ReportError, Result};
use crate::glm::{fit_single_gene, solve_spd, to_dmatrix, GlmFitParams, MIN_MU};
use crate::stats::{mean, sample_variance};

/// True when the design is a pure group model: as many distinct rows as columns.
/// Means are then the fitted group means and need no IRLS.
fn is_linear_mu(design: &DMatrix<f64>) -> bool {
    let mut unique_rows: Vec<Vec<i64>> = Vec::new();
    for row in design.row_iter() {
        let key: Vec<i64> = row.iter().map(|v| (v * 1000.0).round() as i64).collect();
        if !unique_rows.contains(&key) {
            unique_rows.push(key);
        }
    }
    unique_rows.len() == design.ncols()
}

/// Least-squares fitted values `X (X'X)^-1 X'y`
fn linear_fit(y: &[f64], design: &DMatrix<f64>) -> Vec<f64> {
    let y = DVector::from_column_slice(y);
    let xt = design.transpose();
    let beta = solve_spd(&(&xt * design), &(&xt * &y)).unwrap_or_else(|| {
        let mut fallback = DVector::zeros(design.ncols());
        fallback[0] = y.mean();
        fallback
    });
    (design * beta).iter().copied().collect()
}

/// `sum(((y - mu)^2 - mu) / mu^2) / (m - p)` on normalized counts with `mu >= 1`
fn rough_disp_estimate(normalized: &[f64], design: &DMatrix<f64>) -> f64 {
    let m = normalized.len();
    let p = design.ncols();
    let mu = linear_fit(normalized, design);
    let total: f64 = normalized
        .iter()
        .zip(mu.iter())
        .map(|(&y, &mu)| {
            let mu = mu.max(1.0);
            ((y - mu).powi(2) - mu) / (mu * mu)
        })
        .sum();
    (total / (m - p) as f64).max(0.0)
}

/// `(var - xim * mean) / mean^2` where `xim` is the mean of `1 / size_factors`
fn moments_disp_estimate(normalized: &[f64], xim: f64) -> f64 {
    let base_mean = mean(normalized);
    if base_mean <= 0.0 {
        return f64::INFINITY;
    }
    (sample_variance(normalized) - xim * base_mean) / (base_mean * base_mean)
}

/// Estimate gene-wise dispersions for every gene and store them together with
/// the means used for the fit
pub fn estimate_gene_dispersions(dds: &mut DESeqDataSet, params: &DispersionParams) -> Result<()> {
    let size_factors = dds
        .size_factors()
        .ok_or_else(|| ReportError::DispersionEstimationFailed {
            gene_id: "N/A".to_string(),
            reason: "size factors must be estimated first".to_string(),
        })?
        .to_vec();

    let counts = dds.counts().counts();
    let design = to_dmatrix(dds.design_matrix());
    let n_genes = dds.n_genes();
    let n_samples = dds.n_samples();

    let xim = mean(&size_factors.iter().map(|s| 1.0 / s).collect::<Vec<_>>());
    let use_linear_mu = is_linear_mu(&design);

    let results: Vec<(f64, Vec<f64>)> = (0..n_genes)
        .into_par_iter()
        .map(|i| {
            let gene_counts = counts.row(i).to_vec();
            estimate_dispersion_gene(&gene_counts, &size_factors, &design, xim, use_linear_mu, params)
        })
        .collect();

    let mut mu = Array2::zeros((n_genes, n_samples));
    for (i, (_, gene_mu)) in results.iter().enumerate() {
        for (j, &v) in gene_mu.iter().enumerate() {
            mu[[i, j]] = v;
        }
    }
    let dispersions: Array1<f64> = results.iter().map(|(d, _)| *d).collect();

    let estimated = dispersions.iter().filter(|d| d.is_finite()).count();
    log::info!("Gene-wise dispersions estimated for {} of {} genes", estimated, n_genes);

    dds.set_gene_dispersions(dispersions)?;
    dds.set_mu(mu)
}

/// Gene-wise dispersion of one gene and the means it was fitted with.
///
/// Starts from `min(rough, moments)`; falls back to the start when the line
/// search does not improve the posterior and to a grid search when it fails
/// to converge. All-zero genes get NaN.
pub fn estimate_dispersion_gene(
    counts: &[f64],
    size_factors: &[f64],
    design: &DMatrix<f64>,
    xim: f64,
    use_linear_mu: bool,
    params: &DispersionParams,
) -> (f64, Vec<f64>) {
    let n_samples = counts.len();
    if counts.iter().all(|&c| c == 0.0) {
        return (f64::NAN, vec![0.0; n_samples]);
    }

    let min_disp = params.min_disp;
    let max_disp = max_dispersion(n_samples);

    let normalized: Vec<f64> = counts.iter().zip(size_factors).map(|(&c, &s)| c / s).collect();
    let rough = rough_disp_estimate(&normalized, design);
    let moments = moments_disp_estimate(&normalized, xim);
    let alpha_init = rough.min(moments).clamp(min_disp, max_disp);

    let mu: Vec<f64> = if use_linear_mu {
        linear_fit(&normalized, design)
            .iter()
            .zip(size_factors)
            .map(|(m, s)| (m * s).max(MIN_MU))
            .collect()
    } else {
        fit_single_gene(
            ArrayView1::from(counts),
            design,
            ArrayView1::from(size_factors),
            alpha_init,
            &GlmFitParams::default(),
        )
        .mu
    };

    let problem = DispersionProblem {
        counts,
        mu: &mu,
        design,
        prior: None,
    };
    let outcome = line_search(&problem, alpha_init.ln(), params);

    let no_increase = outcome.last_lp < outcome.initial_lp + outcome.initial_lp.abs() / 1e6;
    let mut alpha = if no_increase {
        alpha_init
    } else {
        outcome.log_alpha.exp()
    };

    let converged = outcome.iterations < params.maxit && outcome.iterations != 1;
    if !converged && alpha > min_disp * 10.0 {
        alpha = grid_search(&problem, min_disp, max_disp);
    }

    (alpha.clamp(min_disp, max_disp), mu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CountMatrix, SampleMetadata};
    use crate::normalization::{estimate_size_factors, SizeFactorMethod};
    use ndarray::array;

    fn two_group_design() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            6,
            2,
            &[1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
        )
    }

    #[test]
    fn test_linear_mu_detection() {
        assert!(is_linear_mu(&two_group_design()));
        let continuous = DMatrix::from_row_slice(3, 2, &[1.0, 0.5, 1.0, 1.5, 1.0, 2.5]);
        assert!(!is_linear_mu(&continuous));
    }

    #[test]
    fn test_linear_fit_gives_group_means() {
        let fit = linear_fit(&[1.0, 2.0, 3.0, 10.0, 20.0, 30.0], &two_group_design());
        for v in &fit[..3] {
            assert!((v - 2.0).abs() < 1e-9);
        }
        for v in &fit[3..] {
            assert!((v - 20.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_all_zero_gene_is_nan() {
        let (disp, mu) = estimate_dispersion_gene(
            &[0.0; 6],
            &[1.0; 6],
            &two_group_design(),
            1.0,
            true,
            &DispersionParams::default(),
        );
        assert!(disp.is_nan());
        assert_eq!(mu.len(), 6);
    }

    #[test]
    fn test_dispersion_bounded() {
        let params = DispersionParams::default();
        let sf = [1.0223, 1.0194, 1.052, 1.0169, 0.9944, 1.0543];
        let xim = mean(&sf.iter().map(|s| 1.0 / s).collect::<Vec<_>>());
        let design = two_group_design();

        let (quiet, _) = estimate_dispersion_gene(&[25.0, 24.0, 25.0, 10.0, 20.0, 11.0], &sf, &design, xim, true, &params);
        assert!(quiet >= params.min_disp && quiet <= 10.0);

        let (noisy, _) = estimate_dispersion_gene(&[1.0, 300.0, 5.0, 2.0, 250.0, 40.0], &sf, &design, xim, true, &params);
        assert!(noisy > quiet);
        assert!(noisy <= 10.0);
    }

    #[test]
    fn test_gene_wise_dispersion() {
        let sample_ids: Vec<String> = (1..=6).map(|i| format!("s{}", i)).collect();
        let counts = CountMatrix::new(
            array![
                [100.0, 120.0, 90.0, 110.0, 95.0, 105.0],
                [500.0, 550.0, 480.0, 520.0, 490.0, 510.0],
                [50.0, 45.0, 55.0, 48.0, 52.0, 50.0],
                [0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
            ],
            vec!["gene1".into(), "gene2".into(), "gene3".into(), "gene4".into()],
            sample_ids.clone(),
        )
        .unwrap();
        let mut metadata = SampleMetadata::new(sample_ids).unwrap();
        metadata
            .add_column(
                "condition",
                vec!["A".into(), "A".into(), "A".into(), "B".into(), "B".into(), "B".into()],
            )
            .unwrap();

        let mut dds = DESeqDataSet::new(counts, metadata, "condition", None).unwrap();
        estimate_size_factors(&mut dds, SizeFactorMethod::Ratio).unwrap();
        estimate_gene_dispersions(&mut dds, &DispersionParams::default()).unwrap();

        let dispersions = dds.gene_dispersions().unwrap();
        assert_eq!(dispersions.len(), 4);
        assert!(dispersions.iter().take(3).all(|&x| x > 0.0));
        assert!(dispersions[3].is_nan());
        assert_eq!(dds.mu().unwrap().dim(), (4, 6));
    }
}
