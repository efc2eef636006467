//! Input tables and results output

mod results;
mod tables;

pub use results::{Contrast, DESeqResults, ResultsSummary};
pub use tables::{read_count_matrix, read_sample_design, write_results};
