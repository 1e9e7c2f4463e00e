use crate::engines::evaluation::is_identifier;
use crate::error::{FormulabError, Result};
use crate::types::Unit;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use polars::prelude::{DataFrame, DataType};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;

/// Named n×p matrix of primitive variables
#[derive(Debug, Clone)]
pub struct PrimitiveMatrix {
    names: Vec<String>,
    values: Array2<f64>,
    index: HashMap<String, usize>,
}

impl PrimitiveMatrix {
    pub fn new(names: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if names.len() != values.ncols() {
            return Err(FormulabError::Configuration(format!(
                "{} names for {} primitive columns",
                names.len(),
                values.ncols()
            )));
        }

        if let Some(name) = names.iter().find(|n| !is_identifier(n)) {
            return Err(FormulabError::Configuration(format!(
                "Feature name '{}' is not an identifier (letters, digits and '_', not starting with a digit)",
                name
            )));
        }

        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(FormulabError::Configuration(format!(
                    "Duplicate primitive feature '{}'",
                    name
                )));
            }
        }

        Ok(Self { names, values, index })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.index.get(name).map(|&i| self.values.column(i))
    }

    pub fn select_rows(&self, rows: &[usize]) -> PrimitiveMatrix {
        Self {
            names: self.names.clone(),
            values: self.values.select(Axis(0), rows),
            index: self.index.clone(),
        }
    }

    /// Keep the listed feature columns, in the given order.
    pub fn select_columns(&self, columns: &[usize]) -> Result<PrimitiveMatrix> {
        let names = columns.iter().map(|&j| self.names[j].clone()).collect();
        Self::new(names, self.values.select(Axis(1), columns))
    }
}

/// Primitive features plus response, as loaded from a data source.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub primitives: PrimitiveMatrix,
    pub response: Array1<f64>,
}

impl Dataset {
    pub fn new(primitives: PrimitiveMatrix, response: Array1<f64>) -> Result<Self> {
        if primitives.n_rows() != response.len() {
            return Err(FormulabError::Configuration(format!(
                "Response has {} rows, features have {}",
                response.len(),
                primitives.n_rows()
            )));
        }
        Ok(Self { primitives, response })
    }

    /// Build from named feature columns.
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>, response: Vec<f64>) -> Result<Self> {
        let n = response.len();
        let p = columns.len();
        let mut values = Array2::zeros((n, p));
        let mut names = Vec::with_capacity(p);
        for (j, (name, column)) in columns.into_iter().enumerate() {
            if column.len() != n {
                return Err(FormulabError::Configuration(format!(
                    "Feature '{}' has {} rows, response has {}",
                    name,
                    column.len(),
                    n
                )));
            }
            values.column_mut(j).assign(&Array1::from(column));
            names.push(name);
        }
        Self::new(PrimitiveMatrix::new(names, values)?, Array1::from(response))
    }

    /// Every non-target column of `df` becomes a primitive feature. Header
    /// names outside the descriptor grammar are rewritten by [`feature_name`].
    pub fn from_frame(df: &DataFrame, target: &str) -> Result<Self> {
        let mut response = None;
        let mut columns = Vec::new();

        for name in df.get_column_names() {
            let name = name.to_string();
            let series = df.column(&name)?.cast(&DataType::Float64)?;
            let chunked = series.f64()?;
            if chunked.null_count() > 0 {
                return Err(FormulabError::Configuration(format!(
                    "Column '{}' contains {} null values",
                    name,
                    chunked.null_count()
                )));
            }
            let values: Vec<f64> = chunked.into_no_null_iter().collect();
            if name == target {
                response = Some(values);
            } else {
                let feature = feature_name(&name);
                if feature != name {
                    log::warn!("Renaming feature '{}' to '{}'", name, feature);
                }
                columns.push((feature, values));
            }
        }

        let response = response.ok_or_else(|| {
            FormulabError::Configuration(format!("Target column '{}' not found", target))
        })?;
        Self::from_columns(columns, response)
    }

    pub fn n_rows(&self) -> usize {
        self.response.len()
    }

    /// Reject inputs no downstream routine can work with.
    pub fn validate_shape(&self) -> Result<()> {
        if self.primitives.n_features() == 0 {
            return Err(FormulabError::Configuration(
                "Dataset has no primitive features".to_string(),
            ));
        }
        if self.n_rows() < 3 {
            return Err(FormulabError::Configuration(format!(
                "Dataset needs at least 3 rows, got {}",
                self.n_rows()
            )));
        }
        if self.response.iter().any(|v| !v.is_finite()) {
            return Err(FormulabError::Configuration(
                "Response contains non-finite values".to_string(),
            ));
        }
        Ok(())
    }

    pub fn select_rows(&self, rows: &[usize]) -> Dataset {
        Dataset {
            primitives: self.primitives.select_rows(rows),
            response: self.response.select(Axis(0), rows),
        }
    }

    /// Keep only the named features; unknown names are ignored.
    pub fn retain_features(&self, names: &[String]) -> Result<Dataset> {
        let columns: Vec<usize> = names
            .iter()
            .filter_map(|name| self.primitives.index.get(name).copied())
            .collect();
        Ok(Dataset {
            primitives: self.primitives.select_columns(&columns)?,
            response: self.response.clone(),
        })
    }

    /// Seeded shuffle split into (train, test).
    pub fn split(&self, test_fraction: f64, seed: u64) -> Result<(Dataset, Dataset)> {
        let n = self.n_rows();
        let n_test = (n as f64 * test_fraction).round() as usize;
        if n_test == 0 || n_test >= n {
            return Err(FormulabError::Configuration(format!(
                "Test fraction {} leaves an empty partition of {} rows",
                test_fraction, n
            )));
        }

        let mut rows: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        rows.shuffle(&mut rng);
        let (test, train) = rows.split_at(n_test);
        let mut train = train.to_vec();
        let mut test = test.to_vec();
        train.sort_unstable();
        test.sort_unstable();

        Ok((self.select_rows(&train), self.select_rows(&test)))
    }
}

/// Map a column header onto the identifier grammar: characters other than
/// letters, digits and '_' become '_', and a leading digit gets a '_' prefix.
pub fn feature_name(header: &str) -> String {
    let mut name: String = header
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if !name.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        name.insert(0, '_');
    }
    name
}

/// Units of the primitive features, keyed by name
pub type UnitTable = HashMap<String, Unit>;

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    fn sample() -> Dataset {
        Dataset::from_columns(
            vec![
                ("a".to_string(), vec![1.0, 2.0, 3.0, 4.0]),
                ("b".to_string(), vec![0.5, 0.5, 1.5, 2.5]),
            ],
            vec![1.0, 0.0, 1.0, 0.0],
        )
        .unwrap()
    }

    #[test]
    fn test_column_lookup() {
        let data = sample();
        assert_eq!(data.primitives.column("b").unwrap()[2], 1.5);
        assert!(data.primitives.column("c").is_none());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let values = Array2::zeros((2, 2));
        let result = PrimitiveMatrix::new(vec!["a".into(), "a".into()], values);
        assert!(result.is_err());
    }

    #[test]
    fn test_non_identifier_names_rejected() {
        let values = Array2::zeros((2, 1));
        let result = PrimitiveMatrix::new(vec!["temp.K".into()], values);
        assert!(matches!(result, Err(FormulabError::Configuration(_))));
    }

    #[test]
    fn test_frame_headers_are_mapped_to_identifiers() {
        let df = df!(
            "temp.K" => &[1.0, 2.0, 3.0],
            "2nd rate" => &[0.5, 0.1, 0.2],
            "y" => &[2.0, 4.0, 6.0]
        )
        .unwrap();
        let data = Dataset::from_frame(&df, "y").unwrap();
        assert_eq!(data.primitives.names(), &["temp_K".to_string(), "_2nd_rate".to_string()]);
        assert_eq!(feature_name("x1"), "x1");
        assert_eq!(feature_name(""), "_");
    }

    #[test]
    fn test_split_is_seeded_and_disjoint() {
        let data = sample();
        let (train_a, test_a) = data.split(0.25, 9).unwrap();
        let (train_b, test_b) = data.split(0.25, 9).unwrap();
        assert_eq!(train_a.n_rows(), 3);
        assert_eq!(test_a.n_rows(), 1);
        assert_eq!(train_a.response, train_b.response);
        assert_eq!(test_a.primitives.values(), test_b.primitives.values());
        assert!(data.split(0.0, 1).is_err());
    }

    #[test]
    fn test_from_frame() {
        let df = df!(
            "x" => &[1.0, 2.0, 3.0],
            "n" => &[1i64, 2, 3],
            "y" => &[2.0, 4.0, 6.0]
        )
        .unwrap();
        let data = Dataset::from_frame(&df, "y").unwrap();
        assert_eq!(data.primitives.names(), &["x".to_string(), "n".to_string()]);
        assert_eq!(data.response[2], 6.0);
        assert!(Dataset::from_frame(&df, "missing").is_err());
    }

    #[test]
    fn test_degenerate_shape() {
        let data = Dataset::from_columns(vec![], vec![1.0, 2.0, 3.0]).unwrap();
        assert!(data.validate_shape().is_err());
    }
}
