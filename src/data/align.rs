//! Reconcile count columns with design rows by sample ID

use std::collections::HashSet;

use log::{info, warn};

use crate::data::{CountMatrix, SampleMetadata};
use crate::error::{ReportError, Result};

/// Reorder count columns to follow the design rows.
///
/// Design rows are authoritative: count columns with no design row are dropped
/// (with a warning), while design rows missing from the counts are an error.
/// On success the sample IDs of both outputs are identical and in the same order.
pub fn align_samples(
    counts: &CountMatrix,
    metadata: &SampleMetadata,
) -> Result<CountMatrix> {
    let count_ids = counts.sample_ids();
    {
        let mut seen = HashSet::new();
        if let Some(dup) = count_ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(ReportError::InvalidCountMatrix {
                reason: format!("duplicate sample column '{}'", dup),
            });
        }
    }

    let design_ids: HashSet<&str> = metadata.sample_ids().iter().map(|s| s.as_str()).collect();
    let missing_in_counts: Vec<String> = metadata
        .sample_ids()
        .iter()
        .filter(|id| counts.sample_index(id).is_none())
        .cloned()
        .collect();
    let missing_in_design: Vec<String> = count_ids
        .iter()
        .filter(|id| !design_ids.contains(id.as_str()))
        .cloned()
        .collect();

    if !missing_in_counts.is_empty() {
        return Err(ReportError::SampleMismatch {
            missing_in_counts,
            missing_in_design,
        });
    }
    if !missing_in_design.is_empty() {
        warn!(
            "Dropping {} count column(s) with no design row: {:?}",
            missing_in_design.len(),
            missing_in_design
        );
    }

    // every design ID was found above
    let order: Vec<usize> = metadata
        .sample_ids()
        .iter()
        .filter_map(|id| counts.sample_index(id))
        .collect();

    if order.iter().enumerate().all(|(i, &j)| i == j) && order.len() == counts.n_samples() {
        info!("Sample order already matches the design table");
        return Ok(counts.clone());
    }
    info!("Reordered count columns to match {} design rows", order.len());
    counts.select_samples(&order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn metadata(samples: &[&str]) -> SampleMetadata {
        let mut meta = SampleMetadata::new(ids(samples)).unwrap();
        let conditions = (0..samples.len())
            .map(|i| if i % 2 == 0 { "a".to_string() } else { "b".to_string() })
            .collect();
        meta.add_column("condition", conditions).unwrap();
        meta
    }

    #[test]
    fn test_reorders_to_design() {
        let counts = CountMatrix::new(
            array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
            ids(&["g1", "g2"]),
            ids(&["s1", "s2", "s3"]),
        )
        .unwrap();
        let meta = metadata(&["s3", "s1", "s2"]);
        let aligned = align_samples(&counts, &meta).unwrap();
        assert_eq!(aligned.sample_ids(), meta.sample_ids());
        assert_eq!(aligned.counts()[[0, 0]], 3.0);
        assert_eq!(aligned.counts()[[1, 2]], 5.0);
    }

    #[test]
    fn test_extra_count_columns_dropped() {
        let counts = CountMatrix::new(
            array![[1.0, 2.0, 3.0]],
            ids(&["g1"]),
            ids(&["s1", "extra", "s2"]),
        )
        .unwrap();
        let meta = metadata(&["s1", "s2"]);
        let aligned = align_samples(&counts, &meta).unwrap();
        assert_eq!(aligned.sample_ids(), &ids(&["s1", "s2"])[..]);
    }

    #[test]
    fn test_design_sample_missing_from_counts() {
        let counts = CountMatrix::new(array![[1.0, 2.0]], ids(&["g1"]), ids(&["s1", "s2"])).unwrap();
        let meta = metadata(&["s1", "s2", "s9"]);
        match align_samples(&counts, &meta) {
            Err(ReportError::SampleMismatch { missing_in_counts, .. }) => {
                assert_eq!(missing_in_counts, ids(&["s9"]));
            }
            other => panic!("expected sample mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_id_sets_equal_after_alignment() {
        let counts = CountMatrix::new(
            array![[1.0, 2.0, 3.0, 4.0]],
            ids(&["g1"]),
            ids(&["d", "c", "b", "a"]),
        )
        .unwrap();
        let meta = metadata(&["a", "b", "c", "d"]);
        let aligned = align_samples(&counts, &meta).unwrap();
        let lhs: HashSet<&String> = aligned.sample_ids().iter().collect();
        let rhs: HashSet<&String> = meta.sample_ids().iter().collect();
        assert_eq!(lhs, rhs);
    }
}
