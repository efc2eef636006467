//! Independent filtering on the mean of normalized counts

use crate::io::DESeqResults;
use crate::stats::{lowess, quantile_sorted};
use crate::testing::benjamini_hochberg;

const N_THETA: usize = 50;

/// Choose the `baseMean` quantile that maximizes BH rejections at `alpha`,
/// then store the adjusted p-values computed with genes below it removed.
///
/// The rejection curve over 50 quantiles is smoothed with lowess (`f = 1/5`)
/// and the first quantile whose rejection count exceeds the smoothed maximum
/// minus the residual RMS is taken. With ten or fewer rejections anywhere no
/// genes are filtered.
pub fn independent_filtering(results: &mut DESeqResults, alpha: f64) {
    let n = results.n_genes();
    if n == 0 {
        return;
    }

    let mut sorted_means: Vec<f64> = results.base_means.iter().copied().filter(|m| m.is_finite()).collect();
    if sorted_means.is_empty() {
        results.padj = benjamini_hochberg(&results.pvalues);
        return;
    }
    sorted_means.sort_by(f64::total_cmp);

    let lower = results.base_means.iter().filter(|&&m| m == 0.0).count() as f64 / n as f64;
    let upper = if lower < 0.95 { 0.95 } else { 1.0 };
    let thetas: Vec<f64> = (0..N_THETA)
        .map(|i| lower + (upper - lower) * i as f64 / (N_THETA - 1) as f64)
        .collect();
    let cutoffs: Vec<f64> = thetas.iter().map(|&t| quantile_sorted(&sorted_means, t)).collect();

    let adjusted: Vec<Vec<f64>> = cutoffs
        .iter()
        .map(|&cutoff| {
            let filtered: Vec<f64> = results
                .pvalues
                .iter()
                .zip(results.base_means.iter())
                .map(|(&p, &m)| if m >= cutoff { p } else { f64::NAN })
                .collect();
            benjamini_hochberg(&filtered)
        })
        .collect();
    let rejections: Vec<f64> = adjusted
        .iter()
        .map(|padj| padj.iter().filter(|&&p| p < alpha).count() as f64)
        .collect();

    let max_rejections = rejections.iter().copied().fold(0.0, f64::max);
    let best = if max_rejections <= 10.0 {
        0
    } else {
        select_theta(&thetas, &rejections)
    };

    log::debug!(
        "Independent filtering: theta {:.3}, baseMean cutoff {:.3}, {} rejections",
        thetas[best],
        cutoffs[best],
        rejections[best]
    );
    results.filter_threshold = Some(cutoffs[best]);
    results.padj = adjusted.into_iter().nth(best).unwrap_or_default();
}

fn select_theta(thetas: &[f64], rejections: &[f64]) -> usize {
    let fit = lowess(thetas, rejections, 1.0 / 5.0, 3);
    let residuals: Vec<f64> = rejections
        .iter()
        .zip(fit.iter())
        .filter(|(&r, _)| r > 0.0)
        .map(|(&r, &f)| r - f)
        .collect();
    let rmse = if residuals.is_empty() {
        0.0
    } else {
        (residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len() as f64).sqrt()
    };
    let max_fit = fit.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    [max_fit - rmse, 0.9 * max_fit, 0.8 * max_fit]
        .iter()
        .find_map(|&threshold| rejections.iter().position(|&r| r > threshold))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Contrast;

    fn results_with(base_means: Vec<f64>, pvalues: Vec<f64>) -> DESeqResults {
        let ids = (0..base_means.len()).map(|i| format!("g{}", i)).collect();
        let mut res = DESeqResults::new(ids, Contrast::new("condition", "B", "A"));
        res.base_means = base_means;
        res.pvalues = pvalues;
        res
    }

    #[test]
    fn test_few_rejections_means_no_filtering() {
        let mut res = results_with(vec![1.0, 5.0, 10.0, 50.0], vec![0.5, 0.2, 0.01, 0.9]);
        independent_filtering(&mut res, 0.1);
        assert_eq!(res.padj, benjamini_hochberg(&res.pvalues));
        assert_eq!(res.filter_threshold, Some(1.0));
    }

    #[test]
    fn test_low_count_genes_are_removed() {
        // 200 low-count null genes, then 100 high-count genes whose top 60 by
        // mean carry signal that only survives BH once the low genes are gone
        let mut means = vec![1.0; 200];
        means.extend((0..100).map(|i| 100.0 + i as f64));
        let mut pvalues: Vec<f64> = (0..200).map(|i| 0.2 + 0.8 * i as f64 / 200.0).collect();
        pvalues.extend((0..100).map(|i| if i >= 40 { 0.0008 * (i - 39) as f64 } else { 0.5 }));

        let mut res = results_with(means, pvalues);
        independent_filtering(&mut res, 0.1);

        let threshold = res.filter_threshold.unwrap();
        assert!(threshold > 1.0, "threshold {}", threshold);
        assert!(res.padj[0].is_nan());
        assert!(res.padj[240] < 0.1);
        assert!(res.padj[299] < 0.1);
    }
}
