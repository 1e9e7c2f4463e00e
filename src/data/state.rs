use super::dataset::{Dataset, PrimitiveMatrix, UnitTable};
use crate::error::{FormulabError, Result};
use crate::types::{Descriptor, Unit};
use ndarray::{concatenate, s, Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Index of the bias descriptor in every working set.
pub const BIAS_INDEX: usize = 0;

/// Held-out rows, evaluated through descriptors on demand.
#[derive(Debug, Clone)]
pub struct Holdout {
    pub primitives: PrimitiveMatrix,
    pub response: Array1<f64>,
}

/// A generated column ready to be appended to the working set
#[derive(Debug, Clone)]
pub struct Candidate {
    pub descriptor: Descriptor,
    pub values: Array1<f64>,
    pub unit: Option<Unit>,
}

/// Run state threaded through the search loop.
///
/// Every transition consumes the state and returns a new one, so a stage
/// can never observe a stale copy. `names`, `descriptors` and the columns of
/// `columns` are parallel, as is `units` when dimensional analysis is on.
#[derive(Debug, Clone)]
pub struct DatasetState {
    response: Array1<f64>,
    primitives: PrimitiveMatrix,
    columns: Array2<f64>,
    descriptors: Vec<Descriptor>,
    names: Vec<String>,
    units: Option<Vec<Unit>>,
    unit_table: Option<UnitTable>,
    generation_sizes: Vec<usize>,
    selection_sizes: Vec<Option<usize>>,
    holdout: Option<Holdout>,
}

impl DatasetState {
    pub fn initial(
        train: Dataset,
        holdout: Option<Dataset>,
        unit_table: Option<UnitTable>,
    ) -> Result<Self> {
        let n = train.n_rows();
        let p = train.primitives.n_features();

        let mut descriptors = Vec::with_capacity(p + 1);
        descriptors.push(Descriptor::bias());
        descriptors.extend(train.primitives.names().iter().map(Descriptor::leaf));

        let ones = Array2::<f64>::ones((n, 1));
        let columns = concatenate(Axis(1), &[ones.view(), train.primitives.values().view()])
            .map_err(|e| FormulabError::Computation(e.to_string()))?;

        let units = match &unit_table {
            Some(table) => {
                let rank = table.values().map(|u| u.0.len()).max().unwrap_or(0);
                let mut units = vec![Unit::dimensionless(rank)];
                for name in train.primitives.names() {
                    let unit = table.get(name).ok_or_else(|| {
                        FormulabError::Configuration(format!("No unit given for feature '{}'", name))
                    })?;
                    if unit.0.len() != rank {
                        return Err(FormulabError::Configuration(format!(
                            "Unit of '{}' has {} exponents, expected {}",
                            name,
                            unit.0.len(),
                            rank
                        )));
                    }
                    units.push(unit.clone());
                }
                Some(units)
            }
            None => None,
        };

        let state = Self {
            names: descriptors.iter().map(|d| d.to_string()).collect(),
            response: train.response,
            primitives: train.primitives,
            columns,
            descriptors,
            units,
            unit_table,
            generation_sizes: Vec::new(),
            selection_sizes: Vec::new(),
            holdout: holdout.map(|h| Holdout {
                primitives: h.primitives,
                response: h.response,
            }),
        };
        state.check_invariants()?;
        Ok(state)
    }

    pub fn response(&self) -> ArrayView1<'_, f64> {
        self.response.view()
    }

    pub fn primitives(&self) -> &PrimitiveMatrix {
        &self.primitives
    }

    pub fn columns(&self) -> &Array2<f64> {
        &self.columns
    }

    /// Working columns without the bias.
    pub fn candidate_columns(&self) -> ArrayView2<'_, f64> {
        self.columns.slice(s![.., BIAS_INDEX + 1..])
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn units(&self) -> Option<&[Unit]> {
        self.units.as_deref()
    }

    pub fn unit_table(&self) -> Option<&UnitTable> {
        self.unit_table.as_ref()
    }

    pub fn generation_sizes(&self) -> &[usize] {
        &self.generation_sizes
    }

    pub fn selection_sizes(&self) -> &[Option<usize>] {
        &self.selection_sizes
    }

    pub fn holdout(&self) -> Option<&Holdout> {
        self.holdout.as_ref()
    }

    pub fn width(&self) -> usize {
        self.columns.ncols()
    }

    /// Number of descriptors competing for selection.
    pub fn candidate_count(&self) -> usize {
        self.width() - 1
    }

    pub fn check_invariants(&self) -> Result<()> {
        let width = self.columns.ncols();
        if self.names.len() != width || self.descriptors.len() != width {
            return Err(FormulabError::Computation(format!(
                "State out of sync: {} names, {} descriptors, {} columns",
                self.names.len(),
                self.descriptors.len(),
                width
            )));
        }
        if let Some(units) = &self.units {
            if units.len() != width {
                return Err(FormulabError::Computation(format!(
                    "State out of sync: {} units for {} columns",
                    units.len(),
                    width
                )));
            }
        }
        if !self.descriptors.first().is_some_and(Descriptor::is_bias) {
            return Err(FormulabError::Computation(
                "Bias descriptor missing from working set".to_string(),
            ));
        }
        Ok(())
    }

    /// Keep the listed candidate indices (0-based, bias excluded); the bias always stays.
    pub fn retain_candidates(self, keep: &[usize]) -> Result<Self> {
        let mut indices = Vec::with_capacity(keep.len() + 1);
        indices.push(BIAS_INDEX);
        for &k in keep {
            if k + 1 >= self.width() {
                return Err(FormulabError::Computation(format!(
                    "Candidate index {} out of range for {} candidates",
                    k,
                    self.candidate_count()
                )));
            }
            indices.push(k + 1);
        }
        indices.sort_unstable();
        indices.dedup();
        Ok(self.retain_columns(&indices))
    }

    fn retain_columns(self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.select(Axis(1), indices),
            descriptors: indices.iter().map(|&i| self.descriptors[i].clone()).collect(),
            names: indices.iter().map(|&i| self.names[i].clone()).collect(),
            units: self
                .units
                .map(|units| indices.iter().map(|&i| units[i].clone()).collect()),
            ..self
        }
    }

    pub fn append(self, candidates: Vec<Candidate>) -> Result<Self> {
        if candidates.is_empty() {
            return Ok(self);
        }

        let n = self.columns.nrows();
        let mut block = Array2::zeros((n, candidates.len()));
        let mut descriptors = self.descriptors;
        let mut names = self.names;
        let mut units = self.units;

        for (j, candidate) in candidates.into_iter().enumerate() {
            if candidate.values.len() != n {
                return Err(FormulabError::Computation(format!(
                    "Column for '{}' has {} rows, expected {}",
                    candidate.descriptor,
                    candidate.values.len(),
                    n
                )));
            }
            block.column_mut(j).assign(&candidate.values);
            names.push(candidate.descriptor.to_string());
            descriptors.push(candidate.descriptor);
            if let Some(units) = units.as_mut() {
                let rank = units[BIAS_INDEX].0.len();
                units.push(candidate.unit.unwrap_or_else(|| Unit::dimensionless(rank)));
            }
        }

        let columns = concatenate(Axis(1), &[self.columns.view(), block.view()])
            .map_err(|e| FormulabError::Computation(e.to_string()))?;

        let state = Self {
            columns,
            descriptors,
            names,
            units,
            ..self
        };
        state.check_invariants()?;
        Ok(state)
    }

    /// Swap in rematerialized descriptors and columns; names follow the descriptors.
    pub fn with_rebuilt(self, descriptors: Vec<Descriptor>, columns: Array2<f64>) -> Result<Self> {
        if descriptors.len() != self.descriptors.len() {
            return Err(FormulabError::Computation(format!(
                "Rebuild changed descriptor count from {} to {}",
                self.descriptors.len(),
                descriptors.len()
            )));
        }
        let state = Self {
            names: descriptors.iter().map(|d| d.to_string()).collect(),
            descriptors,
            columns,
            ..self
        };
        state.check_invariants()?;
        Ok(state)
    }

    /// Replace a subset of descriptors (by working-set index) with rebuilt columns.
    pub fn with_replaced(self, replacements: Vec<(usize, Descriptor, Array1<f64>)>) -> Result<Self> {
        let mut columns = self.columns;
        let mut descriptors = self.descriptors;
        let mut names = self.names;
        for (index, descriptor, values) in replacements {
            if index >= descriptors.len() || values.len() != columns.nrows() {
                return Err(FormulabError::Computation(format!(
                    "Replacement for index {} does not fit the working set",
                    index
                )));
            }
            columns.column_mut(index).assign(&values);
            names[index] = descriptor.to_string();
            descriptors[index] = descriptor;
        }
        Ok(Self {
            columns,
            descriptors,
            names,
            ..self
        })
    }

    /// Drop working-set columns by index; the bias cannot be dropped.
    pub fn drop_columns(self, drop: &[usize]) -> Self {
        let keep: Vec<usize> = (0..self.width())
            .filter(|i| *i == BIAS_INDEX || !drop.contains(i))
            .collect();
        self.retain_columns(&keep)
    }

    pub fn record_generation(mut self) -> Self {
        self.generation_sizes.push(self.width());
        self
    }

    pub fn record_selection(mut self, size: Option<usize>) -> Self {
        self.selection_sizes.push(size);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn state() -> DatasetState {
        let data = Dataset::from_columns(
            vec![
                ("a".to_string(), vec![1.0, 2.0, 3.0]),
                ("b".to_string(), vec![4.0, 5.0, 7.0]),
            ],
            vec![0.0, 1.0, 2.0],
        )
        .unwrap();
        DatasetState::initial(data, None, None).unwrap()
    }

    #[test]
    fn test_initial_state_layout() {
        let state = state();
        assert_eq!(state.names(), &["1", "a", "b"]);
        assert_eq!(state.columns().column(0), array![1.0, 1.0, 1.0]);
        assert_eq!(state.candidate_columns().ncols(), 2);
    }

    #[test]
    fn test_append_and_retain_keep_lists_parallel() {
        let state = state()
            .append(vec![Candidate {
                descriptor: Descriptor::shifted(Descriptor::leaf("a")),
                values: array![2.0, 3.0, 4.0],
                unit: None,
            }])
            .unwrap();
        assert_eq!(state.width(), 4);
        assert_eq!(state.names()[3], "(a+$C)");
        state.check_invariants().unwrap();

        let state = state.retain_candidates(&[2]).unwrap();
        assert_eq!(state.names(), &["1", "(a+$C)"]);
        state.check_invariants().unwrap();
    }

    #[test]
    fn test_units_stay_parallel() {
        let data = Dataset::from_columns(
            vec![("a".to_string(), vec![1.0, 2.0, 3.0])],
            vec![0.0, 1.0, 2.0],
        )
        .unwrap();
        let mut table = UnitTable::new();
        table.insert("a".to_string(), Unit(vec![1.0, 0.0]));
        let state = DatasetState::initial(data, None, Some(table)).unwrap();
        assert_eq!(state.units().unwrap().len(), 2);

        let state = state
            .append(vec![Candidate {
                descriptor: Descriptor::leaf("a"),
                values: array![1.0, 2.0, 3.0],
                unit: None,
            }])
            .unwrap();
        assert_eq!(state.units().unwrap().len(), state.width());
    }

    #[test]
    fn test_missing_unit_is_configuration_error() {
        let data = Dataset::from_columns(
            vec![("a".to_string(), vec![1.0, 2.0, 3.0])],
            vec![0.0, 1.0, 2.0],
        )
        .unwrap();
        let table = UnitTable::new();
        let result = DatasetState::initial(data, None, Some(table));
        assert!(matches!(result, Err(FormulabError::Configuration(_))));
    }

    #[test]
    fn test_drop_columns_protects_bias() {
        let state = state().drop_columns(&[0, 1]);
        assert_eq!(state.names(), &["1", "b"]);
    }
}
