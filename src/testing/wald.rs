//! Wald test for differential expression

use std::f64::consts::LN_2;

use ndarray::Axis;

use super::pvalue::calculate_pvalue;
use crate::data::DESeqDataSet;
use crate::error::{ReportError, Result};
use crate::glm::contrast_vector;
use crate::io::{Contrast, DESeqResults};

/// Wald test of `numerator` vs `denominator`.
///
/// With contrast vector `c`, the log2 fold change is `c'beta / ln 2` and its
/// standard error `sqrt(c' Sigma c) / ln 2`, so contrasts between two
/// non-reference levels use the full coefficient covariance. Genes with a zero
/// base mean get a fold change of 0 and no statistic.
pub fn wald_test(dds: &DESeqDataSet, contrast: &Contrast) -> Result<DESeqResults> {
    let coefficients = dds.coefficients().ok_or_else(|| ReportError::InvalidContrast {
        reason: "GLM must be fitted before testing".to_string(),
    })?;
    let covariances = dds.covariances().ok_or_else(|| ReportError::InvalidContrast {
        reason: "coefficient covariances not available".to_string(),
    })?;
    let normalized = dds.normalized_counts().ok_or_else(|| ReportError::InvalidContrast {
        reason: "size factors must be estimated before testing".to_string(),
    })?;

    let info = dds.design_info();
    if info.variable.as_deref() != Some(contrast.variable.as_str()) {
        return Err(ReportError::InvalidContrast {
            reason: format!(
                "contrast variable '{}' is not the design variable {:?}",
                contrast.variable, info.variable
            ),
        });
    }
    let c = contrast_vector(info, &contrast.numerator, &contrast.denominator)?;
    let n_coefs = c.len();

    let mut results = DESeqResults::new(dds.counts().gene_ids().to_vec(), contrast.clone());
    results.base_means = normalized
        .mean_axis(Axis(1))
        .map(|m| m.to_vec())
        .unwrap_or_else(|| vec![f64::NAN; dds.n_genes()]);
    if let Some(dispersions) = dds.dispersions() {
        results.dispersions = dispersions.to_vec();
    }

    for i in 0..dds.n_genes() {
        if results.base_means[i] == 0.0 {
            results.log2_fold_changes[i] = 0.0;
            results.lfc_se[i] = 0.0;
            continue;
        }
        let beta: f64 = (0..n_coefs).map(|j| c[j] * coefficients[[i, j]]).sum();
        let mut variance = 0.0;
        for j in 0..n_coefs {
            for k in 0..n_coefs {
                variance += c[j] * covariances[[i, j, k]] * c[k];
            }
        }
        let se = variance.sqrt();

        results.log2_fold_changes[i] = beta / LN_2;
        results.lfc_se[i] = se / LN_2;
        results.stat[i] = if se > 0.0 && se.is_finite() { beta / se } else { f64::NAN };
        results.pvalues[i] = calculate_pvalue(results.stat[i]);
    }

    log::info!(
        "Wald test {}: {} genes with a p-value",
        contrast,
        results.pvalues.iter().filter(|p| p.is_finite()).count()
    );
    Ok(results)
}
