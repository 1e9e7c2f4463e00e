pub mod dimension;
pub mod operators;
pub mod postprocess;

pub use dimension::{DimensionFilter, DimensionalAnalysis};
pub use operators::Generator;
pub use postprocess::PostProcessor;
