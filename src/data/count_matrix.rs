//! Gene x sample read-count matrix

use std::collections::HashMap;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{ReportError, Result};

/// Rename repeated gene IDs to `id_1`, `id_2`, ... keeping the first occurrence as is
fn deduplicate_ids(ids: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    ids.into_iter()
        .map(|id| {
            let count = seen.entry(id.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                id
            } else {
                let renamed = format!("{}_{}", id, *count - 1);
                log::warn!("Duplicate gene ID '{}' renamed to '{}'", id, renamed);
                renamed
            }
        })
        .collect()
}

/// Read counts for one experiment; rows are genes, columns are samples
#[derive(Debug, Clone)]
pub struct CountMatrix {
    counts: Array2<f64>,
    gene_ids: Vec<String>,
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a count matrix, validating shape and values
    pub fn new(
        counts: Array2<f64>,
        gene_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let (n_genes, n_samples) = counts.dim();

        if gene_ids.len() != n_genes {
            return Err(ReportError::DimensionMismatch {
                expected: format!("{} gene IDs", n_genes),
                got: format!("{} gene IDs", gene_ids.len()),
            });
        }
        if sample_ids.len() != n_samples {
            return Err(ReportError::DimensionMismatch {
                expected: format!("{} sample IDs", n_samples),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }
        if n_genes == 0 || n_samples == 0 {
            return Err(ReportError::EmptyData {
                reason: "count matrix has no genes or no samples".to_string(),
            });
        }

        if counts.iter().any(|&x| x < 0.0 || !x.is_finite()) {
            return Err(ReportError::InvalidCountMatrix {
                reason: "counts must be non-negative finite values".to_string(),
            });
        }
        if counts.iter().all(|&x| x == 0.0) {
            return Err(ReportError::InvalidCountMatrix {
                reason: "all samples have 0 counts for all genes".to_string(),
            });
        }
        if counts.iter().any(|&x| x != x.round()) {
            log::warn!("Some count values are not integers; the NB model expects integer counts");
        }

        Ok(Self {
            counts,
            gene_ids: deduplicate_ids(gene_ids),
            sample_ids,
        })
    }

    pub fn n_genes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.ncols()
    }

    /// Raw counts as a view
    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Counts for one gene across samples
    pub fn gene_counts(&self, gene_idx: usize) -> ArrayView1<'_, f64> {
        self.counts.row(gene_idx)
    }

    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|id| id == sample_id)
    }

    /// Keep the given sample columns, in the given order
    pub fn select_samples(&self, sample_indices: &[usize]) -> Result<Self> {
        let counts = self.counts.select(Axis(1), sample_indices);
        let sample_ids = sample_indices
            .iter()
            .map(|&i| self.sample_ids[i].clone())
            .collect();
        Self::new(counts, self.gene_ids.clone(), sample_ids)
    }

    /// Keep the given gene rows, in the given order
    pub fn select_genes(&self, gene_indices: &[usize]) -> Result<Self> {
        let counts = self.counts.select(Axis(0), gene_indices);
        let gene_ids = gene_indices
            .iter()
            .map(|&i| self.gene_ids[i].clone())
            .collect();
        Self::new(counts, gene_ids, self.sample_ids.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_count_matrix_creation() {
        let counts = array![[10.0, 20.0, 30.0], [5.0, 15.0, 25.0]];
        let matrix = CountMatrix::new(counts, ids(&["g1", "g2"]), ids(&["s1", "s2", "s3"])).unwrap();
        assert_eq!(matrix.n_genes(), 2);
        assert_eq!(matrix.n_samples(), 3);
        assert_eq!(matrix.sample_index("s3"), Some(2));
    }

    #[test]
    fn test_negative_counts_rejected() {
        let counts = array![[10.0, -5.0], [5.0, 15.0]];
        let result = CountMatrix::new(counts, ids(&["g1", "g2"]), ids(&["s1", "s2"]));
        assert!(matches!(result, Err(ReportError::InvalidCountMatrix { .. })));
    }

    #[test]
    fn test_all_zero_rejected() {
        let counts = array![[0.0, 0.0], [0.0, 0.0]];
        assert!(CountMatrix::new(counts, ids(&["g1", "g2"]), ids(&["s1", "s2"])).is_err());
    }

    #[test]
    fn test_duplicate_gene_ids_renamed() {
        let counts = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let matrix = CountMatrix::new(counts, ids(&["g", "g", "g"]), ids(&["s1", "s2"])).unwrap();
        assert_eq!(matrix.gene_ids(), &ids(&["g", "g_1", "g_2"])[..]);
    }

    #[test]
    fn test_select_samples_reorders() {
        let counts = array![[10.0, 20.0, 30.0], [5.0, 15.0, 25.0]];
        let matrix = CountMatrix::new(counts, ids(&["g1", "g2"]), ids(&["a", "b", "c"])).unwrap();
        let sub = matrix.select_samples(&[2, 0]).unwrap();
        assert_eq!(sub.sample_ids(), &ids(&["c", "a"])[..]);
        assert_eq!(sub.counts()[[1, 0]], 25.0);
    }
}
