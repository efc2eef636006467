//! Dispersion estimation for negative binomial models
//!
//! Gene-wise estimates maximize the Cox-Reid adjusted profile likelihood of
//! `log(alpha)` for fixed means; a parametric trend `a0 + a1 / mean` is fitted
//! through them; MAP estimates then shrink each gene towards the trend with a
//! normal prior on `log(alpha)`.

mod gene_wise;
mod map;
mod trend;

pub use gene_wise::{estimate_dispersion_gene, estimate_gene_dispersions};
pub use map::{estimate_map_dispersions, estimate_prior_variance};
pub use trend::{fit_dispersion_trend, TrendFitMethod};

use nalgebra::{DMatrix, DVector};
use statrs::function::gamma::{digamma, ln_gamma};

use crate::data::DESeqDataSet;
use crate::error::{ReportError, Result};

/// Proposals of the line search are kept inside `[-30, 10]` on the log scale
const LOG_ALPHA_HARD_MIN: f64 = -30.0;
const LOG_ALPHA_HARD_MAX: f64 = 10.0;
/// Armijo sufficient-increase constant
const ARMIJO_EPSILON: f64 = 1e-4;

/// Tuning of the dispersion fits
#[derive(Debug, Clone)]
pub struct DispersionParams {
    /// Lower bound on any dispersion
    pub min_disp: f64,
    /// Log-posterior change that counts as converged
    pub disp_tol: f64,
    /// Initial line search step
    pub kappa_0: f64,
    /// Maximum line search iterations
    pub maxit: usize,
    /// Genes this many SDs above the trend keep their gene-wise estimate
    pub outlier_sd: f64,
}

impl Default for DispersionParams {
    fn default() -> Self {
        Self {
            min_disp: 1e-8,
            disp_tol: 1e-6,
            kappa_0: 1.0,
            maxit: 100,
            outlier_sd: 2.0,
        }
    }
}

/// Upper bound on dispersions: `max(10, n_samples)`
pub fn max_dispersion(n_samples: usize) -> f64 {
    (n_samples as f64).max(10.0)
}

/// Estimate gene-wise, trended and MAP dispersions in turn
pub fn estimate_dispersions(
    dds: &mut DESeqDataSet,
    fit_type: TrendFitMethod,
    params: &DispersionParams,
) -> Result<()> {
    let design = dds.design_matrix();
    if design.nrows() <= design.ncols() {
        return Err(ReportError::InvalidInput {
            reason: "the design has as many parameters as samples; no replicates for dispersion estimation"
                .to_string(),
        });
    }

    estimate_gene_dispersions(dds, params)?;
    fit_dispersion_trend(dds, fit_type, params)?;
    estimate_map_dispersions(dds, params)?;
    Ok(())
}

/// Normal prior on `log(alpha)`
#[derive(Debug, Clone, Copy)]
pub(crate) struct LogAlphaPrior {
    pub mean: f64,
    pub variance: f64,
}

/// Data of one gene for the dispersion objective
pub(crate) struct DispersionProblem<'a> {
    pub counts: &'a [f64],
    pub mu: &'a [f64],
    pub design: &'a DMatrix<f64>,
    pub prior: Option<LogAlphaPrior>,
}

impl DispersionProblem<'_> {
    fn cox_reid_matrices(&self, alpha: f64) -> (DMatrix<f64>, DMatrix<f64>) {
        let n = self.counts.len();
        let w = DVector::from_iterator(n, self.mu.iter().map(|&m| 1.0 / (1.0 / m + alpha)));
        let dw = w.map(|wi| -wi * wi);
        let mut xtw = self.design.transpose();
        let mut xtdw = self.design.transpose();
        for j in 0..n {
            xtw.column_mut(j).scale_mut(w[j]);
            xtdw.column_mut(j).scale_mut(dw[j]);
        }
        (&xtw * self.design, &xtdw * self.design)
    }

    /// Log posterior of `log(alpha)`: NB log likelihood, the Cox-Reid term
    /// `-0.5 log|X'WX|` with `w = 1 / (1/mu + alpha)`, and the prior if any
    pub fn log_posterior(&self, log_alpha: f64) -> f64 {
        let alpha = log_alpha.exp();
        let alpha_inv = 1.0 / alpha;
        let ll: f64 = self
            .counts
            .iter()
            .zip(self.mu.iter())
            .map(|(&y, &m)| {
                ln_gamma(y + alpha_inv) - ln_gamma(alpha_inv)
                    - y * (m + alpha_inv).ln()
                    - alpha_inv * (1.0 + m * alpha).ln()
            })
            .sum();

        let (b, _) = self.cox_reid_matrices(alpha);
        let det = b.determinant();
        let cr = if det > 0.0 { -0.5 * det.ln() } else { 0.0 };

        let prior = self
            .prior
            .map(|p| -0.5 * (log_alpha - p.mean).powi(2) / p.variance)
            .unwrap_or(0.0);
        ll + cr + prior
    }

    /// Derivative of [`Self::log_posterior`] with respect to `log(alpha)`
    pub fn d_log_posterior(&self, log_alpha: f64) -> f64 {
        let alpha = log_alpha.exp();
        let alpha_inv = 1.0 / alpha;
        let alpha_sq = alpha * alpha;
        let dll: f64 = self
            .counts
            .iter()
            .zip(self.mu.iter())
            .map(|(&y, &m)| {
                (digamma(alpha_inv) - digamma(y + alpha_inv)) / alpha_sq
                    + y / (alpha_sq * (m + alpha_inv))
                    + (1.0 + m * alpha).ln() / alpha_sq
                    - m / (alpha * (1.0 + m * alpha))
            })
            .sum();

        let (b, db) = self.cox_reid_matrices(alpha);
        let dcr = match b.try_inverse() {
            Some(inv) => -0.5 * (inv * db).trace(),
            None => 0.0,
        };

        let dprior = self
            .prior
            .map(|p| -(log_alpha - p.mean) / p.variance)
            .unwrap_or(0.0);
        (dll + dcr) * alpha + dprior
    }
}

/// Result of the Armijo line search on `log(alpha)`
#[derive(Debug, Clone, Copy)]
pub(crate) struct LineSearchOutcome {
    pub log_alpha: f64,
    pub initial_lp: f64,
    pub last_lp: f64,
    pub iterations: usize,
}

/// Backtracking gradient ascent with the Armijo rule. Accepted steps grow
/// kappa by 10% (capped at `kappa_0`) and every fifth acceptance halves it.
pub(crate) fn line_search(
    problem: &DispersionProblem<'_>,
    start_log_alpha: f64,
    params: &DispersionParams,
) -> LineSearchOutcome {
    let min_log_alpha = (params.min_disp / 10.0).ln();
    let mut log_alpha = start_log_alpha.clamp(LOG_ALPHA_HARD_MIN, LOG_ALPHA_HARD_MAX);
    let initial_lp = problem.log_posterior(log_alpha);
    let mut lp = initial_lp;
    let mut dlp = problem.d_log_posterior(log_alpha);
    let mut kappa = params.kappa_0;
    let mut accepted = 0;
    let mut iterations = params.maxit;

    for iter in 0..params.maxit {
        if !dlp.is_finite() {
            iterations = iter + 1;
            break;
        }
        let raw = log_alpha + kappa * dlp;
        if raw < LOG_ALPHA_HARD_MIN {
            kappa = (LOG_ALPHA_HARD_MIN - log_alpha) / dlp;
        }
        if raw > LOG_ALPHA_HARD_MAX {
            kappa = (LOG_ALPHA_HARD_MAX - log_alpha) / dlp;
        }
        let proposal = log_alpha + kappa * dlp;
        let lp_proposal = problem.log_posterior(proposal);

        if -lp_proposal <= -lp - kappa * ARMIJO_EPSILON * dlp * dlp {
            accepted += 1;
            log_alpha = proposal;
            let change = lp_proposal - lp;
            lp = lp_proposal;
            if change < params.disp_tol || log_alpha < min_log_alpha {
                iterations = iter + 1;
                break;
            }
            dlp = problem.d_log_posterior(log_alpha);
            kappa = (kappa * 1.1).min(params.kappa_0);
            if accepted % 5 == 0 {
                kappa /= 2.0;
            }
        } else {
            kappa /= 2.0;
        }
    }

    LineSearchOutcome {
        log_alpha,
        initial_lp,
        last_lp: lp,
        iterations,
    }
}

/// Coarse-then-fine grid search over `log(alpha)` in `[log min_disp, log max_disp]`
pub(crate) fn grid_search(problem: &DispersionProblem<'_>, min_disp: f64, max_disp: f64) -> f64 {
    const N_GRID: usize = 20;
    let best_on = |lo: f64, hi: f64| -> (f64, f64) {
        let step = (hi - lo) / (N_GRID - 1) as f64;
        (0..N_GRID)
            .map(|i| lo + i as f64 * step)
            .map(|a| (a, problem.log_posterior(a)))
            .filter(|(_, lp)| lp.is_finite())
            .fold((lo, f64::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best })
    };

    let lo = min_disp.ln();
    let hi = max_disp.ln();
    let delta = (hi - lo) / (N_GRID - 1) as f64;
    let (coarse, _) = best_on(lo, hi);
    let (fine, _) = best_on(coarse - delta, coarse + delta);
    fine.exp()
}
