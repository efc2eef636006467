//! Sample distances and hierarchical clustering

use ndarray::{Array2, Axis};

/// Euclidean distances between the columns of `matrix`
pub fn sample_distances(matrix: &Array2<f64>) -> Array2<f64> {
    let n = matrix.ncols();
    let mut distances = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let d = matrix
                .column(i)
                .iter()
                .zip(matrix.column(j).iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            distances[[i, j]] = d;
            distances[[j, i]] = d;
        }
    }
    distances
}

/// Euclidean distances between the rows of `matrix`
pub fn row_distances(matrix: &Array2<f64>) -> Array2<f64> {
    sample_distances(&matrix.t().to_owned())
}

/// Leaf order of agglomerative clustering with complete linkage.
///
/// The pair of clusters with the smallest maximum pairwise distance is merged
/// first; ties go to the pair with the lowest indices. A merged cluster lists
/// the leaves of its lower-index half first.
pub fn cluster_order(distances: &Array2<f64>) -> Vec<usize> {
    let n = distances.len_of(Axis(0));
    if n == 0 {
        return Vec::new();
    }
    let mut clusters: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();

    while clusters.len() > 1 {
        let mut best = (f64::INFINITY, 0, 1);
        for a in 0..clusters.len() {
            for b in (a + 1)..clusters.len() {
                let linkage = clusters[a]
                    .iter()
                    .flat_map(|&i| clusters[b].iter().map(move |&j| distances[[i, j]]))
                    .fold(f64::NEG_INFINITY, f64::max);
                if linkage < best.0 {
                    best = (linkage, a, b);
                }
            }
        }
        let (_, a, b) = best;
        let merged = clusters.remove(b);
        clusters[a].extend(merged);
    }
    clusters.pop().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_sample_distances() {
        let m = array![[0.0, 3.0, 0.0], [0.0, 4.0, 1.0]];
        let d = sample_distances(&m);
        assert_eq!(d[[0, 1]], 5.0);
        assert_eq!(d[[1, 0]], 5.0);
        assert_eq!(d[[0, 2]], 1.0);
        assert_eq!(d[[2, 2]], 0.0);
    }

    #[test]
    fn test_cluster_order_groups_close_samples() {
        // samples 0 and 2 are close, 1 and 3 are close
        let m = array![[0.0, 10.0, 0.5, 10.5]];
        let order = cluster_order(&sample_distances(&m));
        assert_eq!(order.len(), 4);
        let pos = |s: usize| order.iter().position(|&x| x == s).unwrap();
        assert_eq!((pos(0) as i32 - pos(2) as i32).abs(), 1);
        assert_eq!((pos(1) as i32 - pos(3) as i32).abs(), 1);
        assert_eq!(order[0], 0);
    }

    #[test]
    fn test_cluster_order_ties_lowest_index() {
        let d = Array2::from_elem((3, 3), 1.0) - Array2::<f64>::eye(3);
        assert_eq!(cluster_order(&d), vec![0, 1, 2]);
    }

    #[test]
    fn test_row_distances() {
        let d = row_distances(&array![[0.0, 0.0], [3.0, 4.0]]);
        assert_eq!(d[[0, 1]], 5.0);
    }
}
