//! MAP (maximum a posteriori) dispersion estimation: empirical Bayes shrinkage
//! of the gene-wise estimates towards the trend

use nalgebra::DMatrix;
use ndarray::Array1;
use rayon::prelude::*;

use super::{grid_search, line_search, max_dispersion, DispersionParams, DispersionProblem, LogAlphaPrior};
use crate::data::DESeqDataSet;
use crate::error::{ReportError, Result};
use crate::glm::to_dmatrix;
use crate::stats::{mad_squared, trigamma};

/// Lower bound of the prior variance of `log(alpha)`
const MIN_PRIOR_VAR: f64 = 0.25;

/// Shrink gene-wise dispersions towards the trend, reusing the means of the
/// gene-wise step. Genes far above the trend keep their gene-wise value and
/// are flagged as dispersion outliers.
pub fn estimate_map_dispersions(dds: &mut DESeqDataSet, params: &DispersionParams) -> Result<()> {
    let missing = |what: &str| ReportError::DispersionEstimationFailed {
        gene_id: "N/A".to_string(),
        reason: format!("{} required for MAP estimation", what),
    };
    let gene_dispersions = dds.gene_dispersions().ok_or_else(|| missing("gene-wise dispersions"))?;
    let trended = dds.trended_dispersions().ok_or_else(|| missing("trended dispersions"))?;
    let mu = dds.mu().ok_or_else(|| missing("gene-wise means"))?;

    let counts = dds.counts().counts();
    let design = to_dmatrix(dds.design_matrix());
    let n_samples = dds.n_samples();
    let max_disp = max_dispersion(n_samples);

    let (prior_var, var_log_disp_ests) = estimate_prior_variance(
        &gene_dispersions.to_vec(),
        &trended.to_vec(),
        n_samples,
        design.ncols(),
        params.min_disp,
    );
    log::info!(
        "Dispersion prior variance {:.4} (log residual variance {:.4})",
        prior_var,
        var_log_disp_ests
    );

    let map: Vec<f64> = (0..dds.n_genes())
        .into_par_iter()
        .map(|i| {
            let gene_counts = counts.row(i).to_vec();
            let gene_mu = mu.row(i).to_vec();
            fit_map_dispersion(
                &gene_counts,
                &gene_mu,
                &design,
                gene_dispersions[i],
                trended[i],
                prior_var,
                max_disp,
                params,
            )
        })
        .collect();

    let threshold = params.outlier_sd * var_log_disp_ests.sqrt();
    let outliers: Vec<bool> = gene_dispersions
        .iter()
        .zip(trended.iter())
        .map(|(&g, &t)| g.is_finite() && t > 0.0 && g.ln() - t.ln() > threshold)
        .collect();
    let final_dispersions: Array1<f64> = map
        .iter()
        .zip(outliers.iter())
        .zip(gene_dispersions.iter())
        .map(|((&m, &outlier), &g)| if outlier { g } else { m })
        .collect();

    log::info!(
        "MAP dispersions estimated; {} dispersion outliers keep their gene-wise estimate",
        outliers.iter().filter(|&&o| o).count()
    );

    dds.set_dispersion_prior_var(prior_var);
    dds.set_dispersion_outliers(outliers)?;
    dds.set_map_dispersions(final_dispersions)
}

/// Prior variance of `log(alpha)` around the trend, and the raw variance of the
/// log residuals.
///
/// The residual variance is the squared MAD of `log(gene) - log(trend)` over
/// genes with `gene >= 100 * min_disp`; the sampling variance
/// `trigamma((m - p) / 2)` is subtracted. The result is floored at 0.25, which
/// is also used outright for three or fewer residual degrees of freedom.
pub fn estimate_prior_variance(
    gene_dispersions: &[f64],
    trended_dispersions: &[f64],
    n_samples: usize,
    n_coefs: usize,
    min_disp: f64,
) -> (f64, f64) {
    let log_residuals: Vec<f64> = gene_dispersions
        .iter()
        .zip(trended_dispersions.iter())
        .filter(|(&g, &t)| g.is_finite() && t.is_finite() && g >= 100.0 * min_disp && t > 0.0)
        .map(|(&g, &t)| g.ln() - t.ln())
        .collect();

    if log_residuals.len() < 3 {
        return (MIN_PRIOR_VAR, MIN_PRIOR_VAR);
    }
    let var_log_disp_ests = mad_squared(&log_residuals);

    if n_samples <= n_coefs + 3 {
        return (MIN_PRIOR_VAR, var_log_disp_ests);
    }
    let df = (n_samples - n_coefs) as f64;
    let prior_var = (var_log_disp_ests - trigamma(df / 2.0)).max(MIN_PRIOR_VAR);
    (prior_var, var_log_disp_ests)
}

/// MAP dispersion of one gene. Starts from the gene-wise estimate unless it is
/// below a tenth of the trend; falls back to a grid search when the line search
/// does not converge.
#[allow(clippy::too_many_arguments)]
pub(crate) fn fit_map_dispersion(
    counts: &[f64],
    mu: &[f64],
    design: &DMatrix<f64>,
    gene_disp: f64,
    trend_disp: f64,
    prior_var: f64,
    max_disp: f64,
    params: &DispersionParams,
) -> f64 {
    if !gene_disp.is_finite() || !trend_disp.is_finite() || trend_disp <= 0.0 {
        return f64::NAN;
    }

    let start = if gene_disp > 0.1 * trend_disp { gene_disp } else { trend_disp };
    let problem = DispersionProblem {
        counts,
        mu,
        design,
        prior: Some(LogAlphaPrior {
            mean: trend_disp.ln(),
            variance: prior_var,
        }),
    };
    let start = start.clamp(params.min_disp, max_disp);
    let outcome = line_search(&problem, start.ln(), params);

    let alpha = if outcome.iterations < params.maxit {
        outcome.log_alpha.exp()
    } else {
        grid_search(&problem, params.min_disp, max_disp)
    };
    alpha.clamp(params.min_disp, max_disp)
}
