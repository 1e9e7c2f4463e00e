use super::dimension::{DimensionFilter, DimensionalAnalysis};
use super::postprocess::PostProcessor;
use crate::data::{Candidate, DatasetState, UnitTable, BIAS_INDEX};
use crate::error::Result;
use crate::types::{BinaryOp, Descriptor, StageFlags, StageKind, UnaryOp, Unit};
use ndarray::{Array1, ArrayView1, Zip};
use rayon::prelude::*;
use std::collections::HashSet;

/// Operators applied to every column by the all-columns unary pass.
const UNARY_OPERATORS: [UnaryOp; 5] = [
    UnaryOp::Log,
    UnaryOp::Sqrt,
    UnaryOp::Exp,
    UnaryOp::Square,
    UnaryOp::Inverse,
];

/// Produces new descriptor columns from the working set
pub struct Generator {
    surrogate: f64,
    filter: Box<dyn DimensionFilter>,
}

impl Generator {
    /// `surrogate` materializes placeholder columns until they are refined.
    pub fn new(surrogate: f64) -> Self {
        Self {
            surrogate,
            filter: Box::new(DimensionalAnalysis),
        }
    }

    pub fn with_dimension_filter(mut self, filter: Box<dyn DimensionFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Run one operator stage and record the resulting working-set size.
    pub fn apply(&self, state: DatasetState, stage: StageKind, flags: StageFlags) -> Result<DatasetState> {
        let before = state.width();
        let state = match stage {
            StageKind::Binary => {
                let candidates = self.binary_candidates(&state, flags);
                let candidates = PostProcessor::new(state.columns(), state.names()).prune(candidates);
                state.append(candidates)?
            }
            StageKind::Unary => {
                let candidates = self.shifted_expansion(&state, flags);
                let candidates = dedupe_names(state.names(), candidates);
                state.append(candidates)?
            }
            StageKind::Union => {
                let mut candidates = self.unary_candidates(&state, flags);
                candidates.extend(self.binary_candidates(&state, flags));
                let candidates = PostProcessor::new(state.columns(), state.names()).prune(candidates);
                state.append(candidates)?
            }
        };
        log::info!("{} stage: {} -> {} columns", stage, before, state.width());
        Ok(state.record_generation())
    }

    /// Pairwise arithmetic over non-bias columns plus the shiftable term of
    /// every primitive leaf.
    fn binary_candidates(&self, state: &DatasetState, flags: StageFlags) -> Vec<Candidate> {
        let width = state.width();
        let descriptors = state.descriptors();
        let columns = state.columns();
        let unit_table = state.unit_table();

        let pairs: Vec<(usize, usize)> = (0..width)
            .filter(|&i| i != BIAS_INDEX)
            .flat_map(|i| ((i + 1)..width).map(move |j| (i, j)))
            .filter(|&(i, j)| !(descriptors[i].has_placeholder() && descriptors[j].has_placeholder()))
            .collect();

        let mut candidates: Vec<Candidate> = pairs
            .into_par_iter()
            .flat_map_iter(|(i, j)| {
                let (a, b) = (&descriptors[i], &descriptors[j]);
                let (ca, cb) = (columns.column(i), columns.column(j));
                [
                    (BinaryOp::Add, a, b, ca, cb),
                    (BinaryOp::Sub, a, b, ca, cb),
                    (BinaryOp::Mul, a, b, ca, cb),
                    (BinaryOp::Div, a, b, ca, cb),
                    (BinaryOp::Div, b, a, cb, ca),
                ]
                .into_iter()
                .filter_map(move |(op, l, r, cl, cr)| {
                    let descriptor = Descriptor::binary(op, l.clone(), r.clone());
                    let unit = self.unit_for(unit_table, &descriptor)?;
                    Some(Candidate {
                        values: combine(op, cl, cr),
                        descriptor,
                        unit,
                    })
                })
            })
            .collect();

        let existing: HashSet<&str> = state.names().iter().map(String::as_str).collect();
        for (j, descriptor) in descriptors.iter().enumerate() {
            let Descriptor::Leaf(_) = descriptor else {
                continue;
            };
            let column = columns.column(j);
            let mut terms = vec![(
                Descriptor::shifted(descriptor.clone()),
                column.mapv(|v| v + self.surrogate),
            )];
            if flags.reflect_negative {
                terms.push((
                    Descriptor::shifted(Descriptor::unary(UnaryOp::Neg, descriptor.clone())),
                    column.mapv(|v| self.surrogate - v),
                ));
            }
            for (term, values) in terms {
                if existing.contains(term.to_string().as_str()) {
                    continue;
                }
                if let Some(unit) = self.unit_for(unit_table, &term) {
                    candidates.push(Candidate {
                        descriptor: term,
                        values,
                        unit,
                    });
                }
            }
        }
        candidates
    }

    /// `log`, `sqrt`, `abs` (+ `sin`, `log(abs)` by flag) of every bare
    /// shifted term, computed from its materialized column.
    fn shifted_expansion(&self, state: &DatasetState, flags: StageFlags) -> Vec<Candidate> {
        let columns = state.columns();
        state
            .descriptors()
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_shiftable_term())
            .flat_map(|(j, d)| self.expand_shifted(state, d, columns.column(j), flags))
            .collect()
    }

    fn expand_shifted(
        &self,
        state: &DatasetState,
        term: &Descriptor,
        column: ArrayView1<'_, f64>,
        flags: StageFlags,
    ) -> Vec<Candidate> {
        let mut ops: Vec<Vec<UnaryOp>> = vec![vec![UnaryOp::Log], vec![UnaryOp::Sqrt], vec![UnaryOp::Abs]];
        if flags.periodic {
            ops.push(vec![UnaryOp::Sin]);
        }
        if flags.reflect_negative {
            ops.push(vec![UnaryOp::Abs, UnaryOp::Log]);
        }

        ops.into_iter()
            .filter_map(|chain| {
                let mut descriptor = term.clone();
                let mut values = column.to_owned();
                for op in chain {
                    descriptor = Descriptor::unary(op, descriptor);
                    values.mapv_inplace(|v| op.apply(v));
                }
                let unit = self.unit_for(state.unit_table(), &descriptor)?;
                Some(Candidate {
                    descriptor,
                    values,
                    unit,
                })
            })
            .collect()
    }

    /// Unary pass over all non-bias columns; shiftable terms get the shifted
    /// expansion instead of the generic operators.
    fn unary_candidates(&self, state: &DatasetState, flags: StageFlags) -> Vec<Candidate> {
        let mut ops = UNARY_OPERATORS.to_vec();
        if flags.periodic {
            ops.extend([UnaryOp::Sin, UnaryOp::Cos]);
        }
        let columns = state.columns();

        let mut candidates = Vec::new();
        for (j, descriptor) in state.descriptors().iter().enumerate() {
            if j == BIAS_INDEX {
                continue;
            }
            let column = columns.column(j);
            if descriptor.is_shiftable_term() {
                candidates.extend(self.expand_shifted(state, descriptor, column, flags));
                continue;
            }
            for &op in &ops {
                let candidate = Descriptor::unary(op, descriptor.clone());
                if let Some(unit) = self.unit_for(state.unit_table(), &candidate) {
                    candidates.push(Candidate {
                        values: column.mapv(|v| op.apply(v)),
                        descriptor: candidate,
                        unit,
                    });
                }
            }
        }
        candidates
    }

    /// `None` rejects the candidate; `Some(None)` accepts it without unit tracking.
    #[allow(clippy::option_option)]
    fn unit_for(&self, table: Option<&UnitTable>, descriptor: &Descriptor) -> Option<Option<Unit>> {
        match table {
            Some(table) => self.filter.infer(table, descriptor).map(Some),
            None => Some(None),
        }
    }
}

fn combine(op: BinaryOp, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> Array1<f64> {
    Zip::from(&a).and(&b).map_collect(|&x, &y| op.apply(x, y))
}

fn dedupe_names(existing: &[String], candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen: HashSet<String> = existing.iter().cloned().collect();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.descriptor.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Dataset;
    use crate::types::Unit;

    fn state(rows: usize) -> DatasetState {
        let a: Vec<f64> = (0..rows).map(|i| 0.5 + i as f64).collect();
        let b: Vec<f64> = (0..rows).map(|i| 2.0 + (i as f64).powi(2) * 0.1).collect();
        let y: Vec<f64> = (0..rows).map(|i| i as f64).collect();
        let data = Dataset::from_columns(vec![("a".into(), a), ("b".into(), b)], y).unwrap();
        DatasetState::initial(data, None, None).unwrap()
    }

    fn names(state: &DatasetState) -> Vec<&str> {
        state.names().iter().map(String::as_str).collect()
    }

    #[test]
    fn test_binary_stage_emits_pairs_and_shiftable_terms() {
        let g = Generator::new(1.0);
        let out = g.apply(state(6), StageKind::Binary, StageFlags::default()).unwrap();
        let n = names(&out);
        for expected in ["(a+b)", "(a-b)", "(a*b)", "(a/b)", "(b/a)", "(a+$C)", "(b+$C)"] {
            assert!(n.contains(&expected), "missing {}", expected);
        }
        assert_eq!(out.width(), 3 + 5 + 2);
        assert_eq!(out.generation_sizes(), &[10]);
        assert!(out.check_invariants().is_ok());
    }

    #[test]
    fn test_binary_stage_skips_double_placeholders() {
        let g = Generator::new(1.0);
        let once = g.apply(state(6), StageKind::Binary, StageFlags::default()).unwrap();
        let twice = g.apply(once, StageKind::Binary, StageFlags::default()).unwrap();
        assert!(twice.descriptors().iter().all(|d| d.placeholder_count() <= 1));
    }

    #[test]
    fn test_unary_stage_expands_shifted_terms() {
        let g = Generator::new(1.0);
        let binary = g.apply(state(6), StageKind::Binary, StageFlags::default()).unwrap();
        let before = binary.width();
        let unary = g.apply(binary, StageKind::Unary, StageFlags::default()).unwrap();
        assert_eq!(unary.width(), before + 3 * 2);
        let n = names(&unary);
        assert!(n.contains(&"log((a+$C))"));
        assert!(n.contains(&"sqrt((b+$C))"));
        assert!(n.contains(&"abs((a+$C))"));
        assert_eq!(unary.generation_sizes(), &[before, before + 6]);
    }

    #[test]
    fn test_unary_flags_add_terms() {
        let g = Generator::new(1.0);
        let flags = StageFlags {
            periodic: true,
            reflect_negative: true,
        };
        let binary = g.apply(state(6), StageKind::Binary, flags).unwrap();
        assert!(names(&binary).contains(&"(-a+$C)"));
        let unary = g.apply(binary, StageKind::Unary, flags).unwrap();
        let n = names(&unary);
        assert!(n.contains(&"sin((a+$C))"));
        assert!(n.contains(&"log(abs((-b+$C)))"));
    }

    #[test]
    fn test_union_stage_combines_both_passes() {
        let g = Generator::new(1.0);
        let out = g.apply(state(6), StageKind::Union, StageFlags::default()).unwrap();
        let n = names(&out);
        assert!(n.contains(&"log(a)"));
        assert!(n.contains(&"a^2"));
        assert!(n.contains(&"(1/b)"));
        assert!(n.contains(&"(a*b)"));
        assert!(out.columns().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_dimensional_filter_rejects_mixed_sums() {
        let a: Vec<f64> = (0..5).map(|i| 1.0 + i as f64).collect();
        let b: Vec<f64> = (0..5).map(|i| 3.0 + (i as f64).powi(2)).collect();
        let data = Dataset::from_columns(vec![("a".into(), a), ("b".into(), b)], vec![0.0; 5]).unwrap();
        let mut table = UnitTable::new();
        table.insert("a".into(), Unit(vec![1.0]));
        table.insert("b".into(), Unit(vec![0.0]));
        let state = DatasetState::initial(data, None, Some(table)).unwrap();

        let out = Generator::new(1.0)
            .apply(state, StageKind::Binary, StageFlags::default())
            .unwrap();
        let n = names(&out);
        assert!(!n.contains(&"(a+b)"));
        assert!(n.contains(&"(a*b)"));
        assert_eq!(out.units().map(|u| u.len()), Some(out.width()));
    }
}
