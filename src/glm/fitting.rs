//! GLM fitting using Iteratively Reweighted Least Squares (IRLS)

use nalgebra::{DMatrix, DVector};
use ndarray::{Array2, Array3, ArrayView1};
use rayon::prelude::*;

use super::negative_binomial::{nb_log_likelihood, nb_mean, nb_weight, LARGE_BETA, MIN_MU};
use super::to_dmatrix;
use crate::data::DESeqDataSet;
use crate::error::{ReportError, Result};

/// Parameters for the per-gene NB GLM
#[derive(Debug, Clone)]
pub struct GlmFitParams {
    /// Maximum IRLS iterations
    pub maxit: usize,
    /// Relative deviance change that counts as converged
    pub beta_tol: f64,
}

impl Default for GlmFitParams {
    fn default() -> Self {
        Self {
            maxit: 100,
            beta_tol: 1e-8,
        }
    }
}

/// Ridge penalty on every coefficient. 1e-6 on the log2 scale, expressed on
/// the natural-log scale the fit works in.
pub fn ridge_lambda() -> f64 {
    let ln2 = std::f64::consts::LN_2;
    1e-6 / (ln2 * ln2)
}

/// Fit of one gene
#[derive(Debug, Clone)]
pub struct GlmFitResult {
    /// Natural-log scale coefficients
    pub coefficients: Vec<f64>,
    pub standard_errors: Vec<f64>,
    pub covariance: DMatrix<f64>,
    pub hat_diagonals: Vec<f64>,
    pub mu: Vec<f64>,
    pub deviance: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl GlmFitResult {
    fn missing(n_coefs: usize, n_samples: usize) -> Self {
        Self {
            coefficients: vec![f64::NAN; n_coefs],
            standard_errors: vec![f64::NAN; n_coefs],
            covariance: DMatrix::from_element(n_coefs, n_coefs, f64::NAN),
            hat_diagonals: vec![f64::NAN; n_samples],
            mu: vec![f64::NAN; n_samples],
            deviance: f64::NAN,
            iterations: 0,
            converged: false,
        }
    }
}

/// Fit the NB GLM for every gene with its final dispersion, storing
/// coefficients, standard errors, covariances and hat diagonals on the dataset
pub fn fit_glm(dds: &mut DESeqDataSet, params: &GlmFitParams) -> Result<()> {
    let size_factors = dds.size_factors().ok_or_else(|| ReportError::InvalidInput {
        reason: "size factors must be estimated before fitting the GLM".to_string(),
    })?;
    let dispersions = dds.dispersions().ok_or_else(|| ReportError::InvalidInput {
        reason: "dispersions must be estimated before fitting the GLM".to_string(),
    })?;

    let counts = dds.counts().counts();
    let design = to_dmatrix(dds.design_matrix());
    let n_genes = dds.n_genes();
    let n_samples = dds.n_samples();
    let n_coefs = design.ncols();

    let fits: Vec<GlmFitResult> = (0..n_genes)
        .into_par_iter()
        .map(|i| {
            let row = counts.row(i);
            let alpha = dispersions[i];
            if !alpha.is_finite() || row.sum() == 0.0 {
                GlmFitResult::missing(n_coefs, n_samples)
            } else {
                fit_single_gene(row, &design, size_factors.view(), alpha, params)
            }
        })
        .collect();

    let mut coefficients = Array2::from_elem((n_genes, n_coefs), f64::NAN);
    let mut standard_errors = Array2::from_elem((n_genes, n_coefs), f64::NAN);
    let mut covariances = Array3::from_elem((n_genes, n_coefs, n_coefs), f64::NAN);
    let mut hat_diagonals = Array2::from_elem((n_genes, n_samples), f64::NAN);
    let mut mu = Array2::from_elem((n_genes, n_samples), f64::NAN);
    let mut converged = Vec::with_capacity(n_genes);

    for (i, fit) in fits.iter().enumerate() {
        for j in 0..n_coefs {
            coefficients[[i, j]] = fit.coefficients[j];
            standard_errors[[i, j]] = fit.standard_errors[j];
            for k in 0..n_coefs {
                covariances[[i, j, k]] = fit.covariance[(j, k)];
            }
        }
        for j in 0..n_samples {
            hat_diagonals[[i, j]] = fit.hat_diagonals[j];
            mu[[i, j]] = fit.mu[j];
        }
        converged.push(fit.converged);
    }

    let fitted = fits.iter().filter(|f| f.iterations > 0).count();
    let not_converged = fits.iter().filter(|f| f.iterations > 0 && !f.converged).count();
    log::info!("Fitted NB GLM for {} genes ({} coefficients)", fitted, n_coefs);
    if not_converged > 0 {
        log::warn!("{} genes did not converge in the GLM fit", not_converged);
    }

    dds.set_glm_fit(coefficients, standard_errors, covariances, hat_diagonals, mu, converged)
}

/// IRLS for one gene with fixed dispersion `alpha`.
///
/// Starts from least squares on `log(k/s + 0.1)`, floors fitted means at
/// [`MIN_MU`], and stops when the relative deviance change drops below
/// `beta_tol`. A coefficient beyond [`LARGE_BETA`] marks the fit as not converged.
pub fn fit_single_gene(
    counts: ArrayView1<f64>,
    design: &DMatrix<f64>,
    size_factors: ArrayView1<f64>,
    alpha: f64,
    params: &GlmFitParams,
) -> GlmFitResult {
    let n_samples = counts.len();
    let n_coefs = design.ncols();
    let lambda = ridge_lambda();
    let ridge = DMatrix::from_diagonal_element(n_coefs, n_coefs, lambda);

    let log_norm = DVector::from_iterator(
        n_samples,
        counts
            .iter()
            .zip(size_factors.iter())
            .map(|(&k, &s)| (k / s + 0.1).ln()),
    );
    let xt = design.transpose();
    let mut beta = solve_spd(&(&xt * design), &(&xt * &log_norm))
        .filter(|b| b.iter().all(|v| v.is_finite()))
        .unwrap_or_else(|| {
            let mut b = DVector::zeros(n_coefs);
            b[0] = log_norm.mean();
            b
        });

    let means = |beta: &DVector<f64>| -> Vec<f64> {
        let eta = design * beta;
        (0..n_samples)
            .map(|j| nb_mean(eta[j], size_factors[j]).max(MIN_MU))
            .collect()
    };
    let deviance = |mu: &[f64]| -> f64 {
        mu.iter()
            .zip(counts.iter())
            .map(|(&m, &k)| -2.0 * nb_log_likelihood(k, m, alpha))
            .sum()
    };

    let mut mu = means(&beta);
    let mut dev_old = 0.0;
    let mut converged = false;
    let mut iterations = 0;

    for iter in 0..params.maxit {
        iterations = iter + 1;
        let w = DVector::from_iterator(n_samples, mu.iter().map(|&m| nb_weight(m, alpha)));
        let z = DVector::from_iterator(
            n_samples,
            (0..n_samples).map(|j| (mu[j] / size_factors[j]).ln() + (counts[j] - mu[j]) / mu[j]),
        );
        let xtw = weighted_transpose(design, &w);
        let next = match solve_spd(&(&xtw * design + &ridge), &(&xtw * &z)) {
            Some(b) => b,
            None => break,
        };
        if next.iter().any(|b| !b.is_finite() || b.abs() > LARGE_BETA) {
            log::debug!("IRLS stopped: coefficient beyond {}", LARGE_BETA);
            break;
        }
        beta = next;
        mu = means(&beta);

        let dev = deviance(&mu);
        let conv_test = (dev - dev_old).abs() / (dev.abs() + 0.1);
        if conv_test.is_nan() {
            break;
        }
        if iter > 0 && conv_test < params.beta_tol {
            converged = true;
            break;
        }
        dev_old = dev;
    }

    // sandwich covariance (X'WX + L)^-1 X'WX (X'WX + L)^-1
    let w = DVector::from_iterator(n_samples, mu.iter().map(|&m| nb_weight(m, alpha)));
    let xtw = weighted_transpose(design, &w);
    let xtwx = &xtw * design;
    let (covariance, hat_diagonals) = match invert_spd(&(&xtwx + &ridge)) {
        Some(inv) => {
            let cov = &inv * &xtwx * &inv;
            let hat = (0..n_samples)
                .map(|j| {
                    let xj = design.row(j).transpose();
                    w[j] * (xj.transpose() * &inv * &xj)[(0, 0)]
                })
                .collect();
            (cov, hat)
        }
        None => (
            DMatrix::from_element(n_coefs, n_coefs, f64::NAN),
            vec![f64::NAN; n_samples],
        ),
    };
    let standard_errors = (0..n_coefs)
        .map(|j| {
            let v = covariance[(j, j)];
            if v > 0.0 {
                v.sqrt()
            } else {
                f64::NAN
            }
        })
        .collect();

    GlmFitResult {
        coefficients: beta.iter().copied().collect(),
        standard_errors,
        covariance,
        hat_diagonals,
        deviance: deviance(&mu),
        mu,
        iterations,
        converged,
    }
}

/// `X' diag(w)`
fn weighted_transpose(design: &DMatrix<f64>, w: &DVector<f64>) -> DMatrix<f64> {
    let mut xtw = design.transpose();
    for (j, mut col) in xtw.column_iter_mut().enumerate() {
        col *= w[j];
    }
    xtw
}

/// Solve a symmetric positive definite system, falling back to LU
pub(crate) fn solve_spd(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    match a.clone().cholesky() {
        Some(chol) => Some(chol.solve(b)),
        None => a.clone().lu().solve(b),
    }
}

pub(crate) fn invert_spd(a: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    match a.clone().cholesky() {
        Some(chol) => Some(chol.inverse()),
        None => a.clone().try_inverse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    fn two_group_design() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            6,
            2,
            &[1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
        )
    }

    #[test]
    fn test_fit_recovers_fold_change() {
        let counts: Array1<f64> = array![100.0, 110.0, 90.0, 400.0, 420.0, 380.0];
        let sf: Array1<f64> = Array1::ones(6);
        let fit = fit_single_gene(counts.view(), &two_group_design(), sf.view(), 0.01, &GlmFitParams::default());
        assert!(fit.converged);
        assert!((fit.coefficients[0] - 100.0_f64.ln()).abs() < 1e-3);
        assert!((fit.coefficients[1] - 4.0_f64.ln()).abs() < 1e-3);
        assert!(fit.standard_errors.iter().all(|s| s.is_finite() && *s > 0.0));
    }

    #[test]
    fn test_size_factors_absorbed() {
        let counts: Array1<f64> = array![100.0, 200.0, 100.0, 200.0, 400.0, 200.0];
        let sf: Array1<f64> = array![1.0, 2.0, 1.0, 1.0, 2.0, 1.0];
        let fit = fit_single_gene(counts.view(), &two_group_design(), sf.view(), 0.01, &GlmFitParams::default());
        assert!((fit.coefficients[1] - 2.0_f64.ln()).abs() < 1e-3);
    }

    #[test]
    fn test_hat_diagonals_sum_to_rank() {
        let counts: Array1<f64> = array![10.0, 12.0, 8.0, 30.0, 33.0, 27.0];
        let sf: Array1<f64> = Array1::ones(6);
        let fit = fit_single_gene(counts.view(), &two_group_design(), sf.view(), 0.05, &GlmFitParams::default());
        let trace: f64 = fit.hat_diagonals.iter().sum();
        assert!((trace - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_zero_group_does_not_converge_to_infinity() {
        let counts: Array1<f64> = array![0.0, 0.0, 0.0, 50.0, 60.0, 40.0];
        let sf: Array1<f64> = Array1::ones(6);
        let fit = fit_single_gene(counts.view(), &two_group_design(), sf.view(), 0.1, &GlmFitParams::default());
        assert!(fit.coefficients.iter().all(|b| b.is_finite() && b.abs() <= LARGE_BETA));
    }

    #[test]
    fn test_solve_spd() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let b = DVector::from_vec(vec![1.0, 2.0]);
        let x = solve_spd(&a, &b).unwrap();
        assert!((&a * &x - b).norm() < 1e-12);
    }
}
