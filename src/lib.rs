//! deseq_report: differential expression report for a two-condition RNA-seq experiment
//!
//! Reads a gene x sample count matrix and a sample design, fits the DESeq2
//! negative binomial model for `~ condition`, applies the variance stabilizing
//! transform and writes an HTML report with the diagnostic figures inlined as SVG.
//!
//! # Example
//!
//! ```ignore
//! use deseq_report::prelude::*;
//!
//! let config = ReportConfig {
//!     counts: "counts.tsv.gz".into(),
//!     design: "design.csv".into(),
//!     ..Default::default()
//! };
//! let outcome = run_report(&config)?;
//! println!("{}", outcome.results.summary(config.alpha));
//! ```

pub mod cli;
pub mod config;
pub mod data;
pub mod dispersion;
pub mod error;
pub mod explore;
pub mod filter;
pub mod glm;
pub mod io;
pub mod normalization;
pub mod pipeline;
pub mod plot;
pub mod report;
pub mod stats;
pub mod testing;
pub mod transform;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::ReportConfig;
    pub use crate::data::{align_samples, CountMatrix, DESeqDataSet, SampleMetadata};
    pub use crate::dispersion::{estimate_dispersions, DispersionParams, TrendFitMethod};
    pub use crate::error::{ReportError, Result};
    pub use crate::glm::{fit_glm, DesignInfo, GlmFitParams};
    pub use crate::io::{read_count_matrix, read_sample_design, write_results, Contrast, DESeqResults};
    pub use crate::normalization::{estimate_size_factors, SizeFactorMethod};
    pub use crate::pipeline::{run_report, ReportOutcome};
    pub use crate::report::Report;
    pub use crate::testing::{benjamini_hochberg, results, wald_test};
    pub use crate::transform::{vst, VstMethod, VstResult};
}

use prelude::*;

/// Fit the model: size factors (unless already set), dispersions, then the GLM
pub fn run_deseq(dds: &mut DESeqDataSet) -> Result<()> {
    if !dds.has_size_factors() {
        estimate_size_factors(dds, SizeFactorMethod::Ratio)?;
    }
    estimate_dispersions(dds, TrendFitMethod::Parametric, &DispersionParams::default())?;
    fit_glm(dds, &GlmFitParams::default())?;
    Ok(())
}
