//! Negative binomial generalized linear model

mod design;
mod fitting;
mod negative_binomial;

pub use design::{check_full_rank, contrast_vector, create_design_matrix, intercept_design, DesignInfo};
pub use fitting::{fit_glm, fit_single_gene, ridge_lambda, GlmFitParams, GlmFitResult};
pub(crate) use fitting::solve_spd;
pub use negative_binomial::{nb_log_likelihood, nb_mean, nb_weight, LARGE_BETA, MIN_MU};

use nalgebra::DMatrix;
use ndarray::Array2;

/// Copy an ndarray matrix into nalgebra's column-major layout
pub(crate) fn to_dmatrix(matrix: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(matrix.nrows(), matrix.ncols(), |i, j| matrix[[i, j]])
}
