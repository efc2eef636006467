//! P-value filters applied to Wald results

mod cooks;
mod independent;

pub use cooks::{
    cooks_cutoff, cooks_distances, filter_by_cooks, max_cooks_per_gene, robust_moments_dispersion,
    MIN_REPLICATES_FOR_COOKS,
};
pub use independent::independent_filtering;
