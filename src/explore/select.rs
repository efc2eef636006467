//! Row selection and centring for heatmaps and PCA

use ndarray::{Array2, Axis};

use crate::stats::{mean, sample_variance};

/// Indices of the `n` rows with the largest `score`, best first. Ties keep the
/// lower index first.
fn top_rows(scores: Vec<f64>, n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).filter(|&i| scores[i].is_finite()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order.truncate(n);
    order
}

/// Rows with the highest mean, in descending order of mean
pub fn top_by_mean(matrix: &Array2<f64>, n: usize) -> Vec<usize> {
    let scores = matrix.rows().into_iter().map(|row| mean(&row.to_vec())).collect();
    top_rows(scores, n)
}

/// Rows with the highest sample variance, in descending order of variance
pub fn top_by_variance(matrix: &Array2<f64>, n: usize) -> Vec<usize> {
    let scores = matrix
        .rows()
        .into_iter()
        .map(|row| sample_variance(&row.to_vec()))
        .collect();
    top_rows(scores, n)
}

/// Subtract each row's mean
pub fn center_rows(matrix: &Array2<f64>) -> Array2<f64> {
    let mut centered = matrix.clone();
    for mut row in centered.axis_iter_mut(Axis(0)) {
        let m = row.mean().unwrap_or(0.0);
        row.mapv_inplace(|v| v - m);
    }
    centered
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_top_by_mean() {
        let m = array![[1.0, 1.0], [5.0, 7.0], [3.0, 3.0], [6.0, 6.0]];
        assert_eq!(top_by_mean(&m, 2), vec![1, 3]);
        assert_eq!(top_by_mean(&m, 10).len(), 4);
    }

    #[test]
    fn test_top_by_variance() {
        let m = array![[1.0, 1.0, 1.0], [0.0, 5.0, 10.0], [2.0, 3.0, 4.0]];
        assert_eq!(top_by_variance(&m, 2), vec![1, 2]);
    }

    #[test]
    fn test_center_rows() {
        let c = center_rows(&array![[1.0, 3.0], [10.0, 20.0]]);
        assert_eq!(c, array![[-1.0, 1.0], [-5.0, 5.0]]);
    }
}
