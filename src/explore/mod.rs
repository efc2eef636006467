//! Exploratory summaries of the transformed matrix: gene selection, sample
//! distances, clustering and PCA

mod cluster;
mod pca;
mod select;

pub use cluster::{cluster_order, row_distances, sample_distances};
pub use pca::{pca, PcaResult};
pub use select::{center_rows, top_by_mean, top_by_variance};
