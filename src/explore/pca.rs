//! Principal component analysis of samples

use nalgebra::DMatrix;
use ndarray::{Array2, Axis};

use super::select::{center_rows, top_by_variance};
use crate::error::{ReportError, Result};

/// Sample scores on the first two components
#[derive(Debug, Clone)]
pub struct PcaResult {
    pub pc1: Vec<f64>,
    pub pc2: Vec<f64>,
    /// Fraction of variance explained by each component, largest first
    pub percent_var: Vec<f64>,
    /// Number of rows the components were computed from
    pub n_features: usize,
}

/// PCA of the columns of `matrix` (genes x samples) on its `ntop` most
/// variable rows.
///
/// Each row is centred and the components are taken from the eigen
/// decomposition of the sample Gram matrix. Signs are fixed so the
/// largest-magnitude gene loading of each component is positive.
pub fn pca(matrix: &Array2<f64>, ntop: usize) -> Result<PcaResult> {
    let n_samples = matrix.ncols();
    if n_samples < 2 {
        return Err(ReportError::InvalidInput {
            reason: format!("PCA needs at least two samples, got {}", n_samples),
        });
    }
    let rows = top_by_variance(matrix, ntop);
    if rows.is_empty() {
        return Err(ReportError::EmptyData {
            reason: "no rows with a finite variance for PCA".to_string(),
        });
    }
    let centered = center_rows(&matrix.select(Axis(0), &rows));
    let n_features = centered.nrows();

    // samples x features
    let x = DMatrix::from_fn(n_samples, n_features, |i, j| centered[[j, i]]);
    let gram = &x * x.transpose();
    let eigen = gram.symmetric_eigen();

    let mut order: Vec<usize> = (0..n_samples).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
    let eigenvalues: Vec<f64> = order.iter().map(|&k| eigen.eigenvalues[k].max(0.0)).collect();
    let total: f64 = eigenvalues.iter().sum();
    let percent_var = eigenvalues
        .iter()
        .map(|&l| if total > 0.0 { l / total } else { 0.0 })
        .collect();

    let scores = |rank: usize| -> Vec<f64> {
        let Some(&k) = order.get(rank) else {
            return vec![0.0; n_samples];
        };
        let lambda = eigenvalues[rank];
        let u = eigen.eigenvectors.column(k);
        if lambda <= 0.0 {
            return vec![0.0; n_samples];
        }
        let loadings = x.transpose() * u;
        let sign = loadings
            .iter()
            .copied()
            .max_by(|a, b| a.abs().total_cmp(&b.abs()))
            .map(|v| if v < 0.0 { -1.0 } else { 1.0 })
            .unwrap_or(1.0);
        u.iter().map(|v| sign * v * lambda.sqrt()).collect()
    };

    Ok(PcaResult {
        pc1: scores(0),
        pc2: scores(1),
        percent_var,
        n_features,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_pca_separates_groups() {
        // two groups of samples differing in the first two genes
        let m = array![
            [1.0, 1.2, 0.9, 8.0, 8.1, 7.9],
            [5.0, 5.1, 4.9, 1.0, 1.2, 0.8],
            [3.0, 3.0, 3.0, 3.0, 3.0, 3.0],
        ];
        let res = pca(&m, 500).unwrap();
        assert_eq!(res.n_features, 3);
        assert!(res.percent_var[0] > 0.95);
        assert!((res.percent_var.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        let left: f64 = res.pc1[..3].iter().sum();
        let right: f64 = res.pc1[3..].iter().sum();
        assert!(left * right < 0.0);
        // scores are centred
        assert!(res.pc1.iter().sum::<f64>().abs() < 1e-9);
    }

    #[test]
    fn test_pca_sign_convention() {
        let m = array![[0.0, 0.0, 10.0, 10.0], [1.0, 1.0, 1.0, 1.0]];
        let res = pca(&m, 2).unwrap();
        // the only loading is on gene 0 and must be positive, so high samples score positive
        assert!(res.pc1[2] > 0.0 && res.pc1[0] < 0.0);
        assert!(res.pc2.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_pca_needs_two_samples() {
        assert!(pca(&array![[1.0], [2.0]], 10).is_err());
    }
}
