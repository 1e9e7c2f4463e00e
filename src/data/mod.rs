pub mod connectors;
pub mod dataset;
pub mod state;

pub use connectors::CsvConnector;
pub use dataset::{Dataset, PrimitiveMatrix, UnitTable};
pub use state::{Candidate, DatasetState, Holdout, BIAS_INDEX};
