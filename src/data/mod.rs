//! Data structures for the report: counts, sample design and the fitted dataset

mod align;
mod count_matrix;
mod dataset;
mod metadata;

pub use align::align_samples;
pub use count_matrix::CountMatrix;
pub use dataset::DESeqDataSet;
pub use metadata::SampleMetadata;
