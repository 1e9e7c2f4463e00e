use crate::data::dataset::Dataset;
use crate::error::{FormulabError, Result};
use polars::prelude::*;
use std::path::Path;

pub struct CsvConnector;

impl CsvConnector {
    /// Load CSV file into DataFrame
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
            .finish()?;

        Ok(df)
    }

    /// Load a CSV file and split it into primitive features and the target column.
    pub fn load_dataset<P: AsRef<Path>>(path: P, target: &str) -> Result<Dataset> {
        let df = Self::load(&path)?;

        let non_numeric = Self::non_numeric_columns(&df);
        if !non_numeric.is_empty() {
            return Err(FormulabError::Configuration(format!(
                "Non-numeric columns in {}: {:?}",
                path.as_ref().display(),
                non_numeric
            )));
        }

        let dataset = Dataset::from_frame(&df, target)?;
        log::info!(
            "Loaded {} rows, {} primitive features from {}",
            dataset.n_rows(),
            dataset.primitives.n_features(),
            path.as_ref().display()
        );
        Ok(dataset)
    }

    fn non_numeric_columns(df: &DataFrame) -> Vec<String> {
        df.get_columns()
            .iter()
            .filter(|c| !c.dtype().is_primitive_numeric())
            .map(|c| c.name().to_string())
            .collect()
    }
}
