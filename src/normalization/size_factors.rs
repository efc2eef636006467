//! Size factor estimation using the median of ratios method

use ndarray::{Array1, ArrayView2, Axis};

use crate::data::DESeqDataSet;
use crate::error::{ReportError, Result};
use crate::stats::{mean, median};

/// Method for size factor estimation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeFactorMethod {
    /// Median of ratios against the geometric mean of genes with no zero counts
    Ratio,
    /// Geometric means over positive counts only, for sparse data
    PosCounts,
}

/// Estimate size factors and store them (and the normalized counts) on the dataset.
///
/// `Ratio` fails with `SizeFactorFailed` when every gene has at least one zero
/// count; `PosCounts` handles such sparse data.
pub fn estimate_size_factors(dds: &mut DESeqDataSet, method: SizeFactorMethod) -> Result<()> {
    let counts = dds.counts().counts();
    let size_factors = median_of_ratios(counts, method == SizeFactorMethod::PosCounts)?;

    log::debug!("Size factors: {:?}", size_factors.to_vec());
    dds.set_size_factors(size_factors)
}

/// Per-sample median of `count / geometric_mean` over usable genes
fn median_of_ratios(counts: ArrayView2<f64>, positive_only: bool) -> Result<Array1<f64>> {
    let n_samples = counts.ncols();

    // log geometric mean per gene; None when the gene cannot serve as a reference
    let log_geo_means: Vec<Option<f64>> = counts
        .axis_iter(Axis(0))
        .map(|row| {
            if positive_only {
                let log_sum: f64 = row.iter().filter(|&&x| x > 0.0).map(|x| x.ln()).sum();
                row.iter().any(|&x| x > 0.0).then(|| log_sum / n_samples as f64)
            } else {
                row.iter()
                    .all(|&x| x > 0.0)
                    .then(|| row.iter().map(|x| x.ln()).sum::<f64>() / n_samples as f64)
            }
        })
        .collect();

    if log_geo_means.iter().all(|g| g.is_none()) {
        return Err(ReportError::SizeFactorFailed {
            reason: "every gene contains at least one zero".to_string(),
        });
    }

    let mut size_factors = Array1::zeros(n_samples);
    for (j, column) in counts.axis_iter(Axis(1)).enumerate() {
        let log_ratios: Vec<f64> = column
            .iter()
            .zip(log_geo_means.iter())
            .filter_map(|(&count, geo)| match geo {
                Some(g) if count > 0.0 => Some(count.ln() - g),
                _ => None,
            })
            .collect();
        if log_ratios.is_empty() {
            return Err(ReportError::SizeFactorFailed {
                reason: format!("sample {} has no positive counts in reference genes", j),
            });
        }
        size_factors[j] = median(&log_ratios).exp();
    }

    if positive_only {
        let log_mean = mean(&size_factors.iter().map(|s| s.ln()).collect::<Vec<_>>());
        size_factors.mapv_inplace(|s| s / log_mean.exp());
    }

    if size_factors.iter().any(|&x| x <= 0.0 || !x.is_finite()) {
        return Err(ReportError::SizeFactorFailed {
            reason: "invalid size factors computed".to_string(),
        });
    }
    Ok(size_factors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CountMatrix, SampleMetadata};
    use ndarray::{array, Array2};

    fn create_test_dds(counts: Array2<f64>) -> DESeqDataSet {
        let n_genes = counts.nrows();
        let gene_ids = (0..n_genes).map(|i| format!("gene{}", i + 1)).collect();
        let sample_ids: Vec<String> = vec!["s1".into(), "s2".into(), "s3".into(), "s4".into()];
        let counts = CountMatrix::new(counts, gene_ids, sample_ids.clone()).unwrap();
        let mut metadata = SampleMetadata::new(sample_ids).unwrap();
        metadata
            .add_column("condition", vec!["A".into(), "A".into(), "B".into(), "B".into()])
            .unwrap();
        DESeqDataSet::new(counts, metadata, "condition", None).unwrap()
    }

    #[test]
    fn test_size_factor_estimation() {
        let mut dds = create_test_dds(array![
            [100.0, 200.0, 100.0, 200.0],
            [50.0, 100.0, 50.0, 100.0],
            [200.0, 400.0, 200.0, 400.0],
            [10.0, 20.0, 10.0, 20.0]
        ]);
        estimate_size_factors(&mut dds, SizeFactorMethod::Ratio).unwrap();

        let sf = dds.size_factors().unwrap();
        assert_eq!(sf.len(), 4);
        assert!(sf.iter().all(|&x| x > 0.0));
        // s2 has 2x the depth of s1
        assert!((sf[1] / sf[0] - 2.0).abs() < 1e-9);

        let norm = dds.normalized_counts().unwrap();
        let row = norm.row(0);
        assert!(row.iter().all(|v| (v - row[0]).abs() < 1e-9));
    }

    #[test]
    fn test_genes_with_zeros_ignored() {
        let mut dds = create_test_dds(array![
            [100.0, 200.0, 100.0, 200.0],
            [0.0, 5000.0, 50.0, 100.0],
            [200.0, 400.0, 200.0, 400.0]
        ]);
        estimate_size_factors(&mut dds, SizeFactorMethod::Ratio).unwrap();
        let sf = dds.size_factors().unwrap();
        assert!((sf[1] / sf[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_ratio_fails_when_all_genes_have_zeros() {
        let sparse = array![
            [0.0, 20.0, 10.0, 20.0],
            [5.0, 0.0, 5.0, 10.0],
            [10.0, 20.0, 0.0, 20.0]
        ];
        let mut dds = create_test_dds(sparse.clone());
        let err = estimate_size_factors(&mut dds, SizeFactorMethod::Ratio).unwrap_err();
        assert!(matches!(err, ReportError::SizeFactorFailed { .. }));
        assert!(dds.size_factors().is_none());

        let mut dds = create_test_dds(sparse);
        estimate_size_factors(&mut dds, SizeFactorMethod::PosCounts).unwrap();
        let sf = dds.size_factors().unwrap();
        let log_mean: f64 = sf.iter().map(|s| s.ln()).sum::<f64>() / 4.0;
        assert!(log_mean.abs() < 1e-9);
    }
}
