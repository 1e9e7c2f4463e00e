//! Symbolic-regression descriptor search.
//!
//! Starting from a handful of primitive features, formulab repeatedly
//! generates nonlinear descriptor columns, screens them, resolves embedded
//! additive constants and finally picks a sparse linear model over the
//! survivors. The result is a closed-form formula.

pub mod config;
pub mod data;
pub mod engines;
pub mod error;
pub mod report;
pub mod types;
pub mod utils;

pub use config::{AppConfig, ConfigManager};
pub use data::{CsvConnector, Dataset, DatasetState, PrimitiveMatrix};
pub use engines::search::SearchEngine;
pub use error::{FormulabError, Result};
pub use report::{ModelSummary, RunReport};
pub use types::{Descriptor, StageKind};
