//! Statistical testing for differential expression

mod fdr;
mod pvalue;
mod wald;

pub use fdr::benjamini_hochberg;
pub use pvalue::calculate_pvalue;
pub use wald::wald_test;

use crate::data::DESeqDataSet;
use crate::error::{ReportError, Result};
use crate::filter::{cooks_cutoff, cooks_distances, filter_by_cooks, independent_filtering};
use crate::io::{Contrast, DESeqResults};

/// First non-reference level against the reference level
pub fn default_contrast(dds: &DESeqDataSet) -> Result<Contrast> {
    let info = dds.design_info();
    match (info.variable.as_deref(), info.levels.as_slice()) {
        (Some(variable), [reference, numerator, ..]) => Ok(Contrast::new(variable, numerator, reference)),
        _ => Err(ReportError::InvalidContrast {
            reason: "the design has no factor with two or more levels".to_string(),
        }),
    }
}

/// Results for `contrast` (or [`default_contrast`]): Wald test, Cook's
/// distance filter, then independent filtering with BH adjustment at `alpha`.
/// Rows stay in count-matrix order.
pub fn results(dds: &DESeqDataSet, contrast: Option<Contrast>, alpha: f64) -> Result<DESeqResults> {
    let contrast = match contrast {
        Some(contrast) => contrast,
        None => default_contrast(dds)?,
    };
    let mut res = wald_test(dds, &contrast)?;

    let cooks = cooks_distances(dds)?;
    let cutoff = cooks_cutoff(dds.n_samples(), dds.design_info().n_coefs());
    filter_by_cooks(dds, &mut res, &cooks, cutoff);

    independent_filtering(&mut res, alpha);
    Ok(res)
}
