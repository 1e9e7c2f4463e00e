use crate::data::Candidate;
use crate::utils::stats;
use ndarray::{Array2, ArrayView1};
use std::collections::{HashMap, HashSet};

/// Relative tolerance under which two columns count as duplicates.
const DUPLICATE_TOLERANCE: f64 = 1e-12;

/// Prunes freshly generated columns against the existing working set.
///
/// Dropped are columns with non-finite values, zero-variance columns, and
/// columns (or names) that duplicate an existing or earlier new column.
/// Existing columns are never touched.
pub struct PostProcessor<'a> {
    existing: &'a Array2<f64>,
    names: HashSet<&'a str>,
    buckets: HashMap<String, Vec<usize>>,
}

impl<'a> PostProcessor<'a> {
    pub fn new(existing: &'a Array2<f64>, existing_names: &'a [String]) -> Self {
        let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
        for (j, column) in existing.columns().into_iter().enumerate() {
            buckets.entry(signature(column)).or_default().push(j);
        }
        Self {
            existing,
            names: existing_names.iter().map(String::as_str).collect(),
            buckets,
        }
    }

    pub fn prune(self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let total = candidates.len();
        let mut accepted: Vec<Candidate> = Vec::with_capacity(total);
        let mut accepted_names: HashSet<String> = HashSet::new();
        let mut new_buckets: HashMap<String, Vec<usize>> = HashMap::new();
        let (mut non_finite, mut constant, mut duplicate) = (0usize, 0usize, 0usize);

        for candidate in candidates {
            let values = candidate.values.view();
            if !stats::is_finite_column(values) {
                non_finite += 1;
                continue;
            }
            if stats::is_constant_column(values) {
                constant += 1;
                continue;
            }
            let name = candidate.descriptor.to_string();
            if self.names.contains(name.as_str()) || accepted_names.contains(&name) {
                duplicate += 1;
                continue;
            }
            let key = signature(values);
            let clashes_existing = self
                .buckets
                .get(&key)
                .is_some_and(|js| js.iter().any(|&j| same_column(self.existing.column(j), values)));
            let clashes_new = new_buckets.get(&key).is_some_and(|ks| {
                ks.iter()
                    .any(|&k| same_column(accepted[k].values.view(), values))
            });
            if clashes_existing || clashes_new {
                duplicate += 1;
                continue;
            }

            new_buckets.entry(key).or_default().push(accepted.len());
            accepted_names.insert(name);
            accepted.push(candidate);
        }

        log::debug!(
            "Post-processing kept {}/{} new columns ({} non-finite, {} constant, {} duplicate)",
            accepted.len(),
            total,
            non_finite,
            constant,
            duplicate
        );
        accepted
    }
}

/// Coarse bucket key; exact comparison happens within a bucket.
fn signature(values: ArrayView1<'_, f64>) -> String {
    let first = values.first().copied().unwrap_or(0.0);
    format!("{:.6e}|{:.6e}", first, stats::mean(values))
}

/// Element-wise equality within `DUPLICATE_TOLERANCE`.
pub fn same_column(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b.iter())
            .all(|(x, y)| (x - y).abs() <= DUPLICATE_TOLERANCE * x.abs().max(y.abs()).max(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Descriptor;
    use ndarray::{array, Array1};

    fn candidate(name: &str, values: Array1<f64>) -> Candidate {
        Candidate {
            descriptor: Descriptor::leaf(name),
            values,
            unit: None,
        }
    }

    #[test]
    fn test_prunes_new_columns_only() {
        let existing = array![[1.0, 2.0], [1.0, 3.0], [1.0, 5.0]];
        let names = vec!["1".to_string(), "a".to_string()];
        let kept = PostProcessor::new(&existing, &names).prune(vec![
            candidate("nan", array![1.0, f64::NAN, 2.0]),
            candidate("flat", array![4.0, 4.0, 4.0]),
            candidate("copy", array![2.0, 3.0, 5.0]),
            candidate("fresh", array![0.5, 0.1, 0.2]),
            candidate("fresh_again", array![0.5, 0.1, 0.2]),
            candidate("a", array![9.0, 8.0, 7.0]),
        ]);
        let names: Vec<String> = kept.iter().map(|c| c.descriptor.to_string()).collect();
        assert_eq!(names, vec!["fresh"]);
    }
}
