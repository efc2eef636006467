//! Transformations of count data for visualization

mod vst;

pub use vst::{vst, VstMethod, VstResult};
