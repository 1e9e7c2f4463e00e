use super::{SubsetModel, SubsetSelection, SubsetSelector};
use crate::config::{Criterion, SelectionConfig};
use crate::error::{FormulabError, Result};
use crate::utils::{least_squares_with_intercept, residual_sum_of_squares, stats};
use ndarray::{ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use std::cmp::Ordering;

/// Lower clamp on RSS before taking its logarithm.
const MIN_RSS: f64 = 1e-300;

/// Best-subset (L0) selection by exhaustive enumeration.
#[derive(Debug, Clone)]
pub struct ExhaustiveSelector {
    pub max_combinations: usize,
}

impl Default for ExhaustiveSelector {
    fn default() -> Self {
        Self::from_config(&SelectionConfig::default())
    }
}

impl ExhaustiveSelector {
    pub fn from_config(config: &SelectionConfig) -> Self {
        Self {
            max_combinations: config.max_combinations,
        }
    }

    fn fit_subset(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, indices: &[usize]) -> Option<SubsetModel> {
        let design = x.select(Axis(1), indices);
        let (intercept, weights) = least_squares_with_intercept(design.view(), y).ok()?;
        let centered = y.mapv(|v| v - intercept);
        let rss = residual_sum_of_squares(design.view(), weights.view(), centered.view());
        rss.is_finite().then(|| SubsetModel {
            indices: indices.to_vec(),
            intercept,
            coefficients: weights.to_vec(),
            rss,
            score: f64::NAN,
        })
    }

    /// Largest size whose cumulative combination count stays within budget.
    fn affordable_size(&self, m: usize, requested: usize) -> usize {
        let mut total: usize = 0;
        let mut size = 0;
        for k in 1..=requested.min(m) {
            total = total.saturating_add(binomial(m, k));
            if total > self.max_combinations && k > 1 {
                break;
            }
            size = k;
        }
        size
    }
}

/// Criterion value for a model with `k` terms plus intercept.
pub fn information_criterion(criterion: Criterion, n: usize, rss: f64, k: usize) -> f64 {
    let n_f = n as f64;
    let fit = n_f * (rss.max(MIN_RSS) / n_f).ln();
    let parameters = (k + 1) as f64;
    match criterion {
        Criterion::Aic => fit + 2.0 * parameters,
        Criterion::Bic => fit + parameters * n_f.ln(),
    }
}

fn better(a: &SubsetModel, b: &SubsetModel) -> Ordering {
    a.rss.total_cmp(&b.rss).then_with(|| a.indices.cmp(&b.indices))
}

fn binomial(n: usize, k: usize) -> usize {
    let k = k.min(n - k.min(n));
    (0..k).fold(1usize, |acc, i| acc.saturating_mul(n - i) / (i + 1))
}

/// Lexicographic k-combinations of `0..n`.
pub fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    if k == 0 || k > n {
        return out;
    }
    let mut current: Vec<usize> = (0..k).collect();
    loop {
        out.push(current.clone());
        let Some(i) = (0..k).rev().find(|&i| current[i] != i + n - k) else {
            return out;
        };
        current[i] += 1;
        for j in (i + 1)..k {
            current[j] = current[j - 1] + 1;
        }
    }
}

impl SubsetSelector for ExhaustiveSelector {
    fn select(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        max_terms: usize,
        criterion: Criterion,
        parallel: bool,
    ) -> Result<SubsetSelection> {
        let usable: Vec<usize> = (0..x.ncols())
            .filter(|&j| stats::is_finite_column(x.column(j)))
            .collect();
        if usable.is_empty() {
            return Err(FormulabError::SelectionExhausted(
                "best-subset selection".to_string(),
            ));
        }
        let k_max = self.affordable_size(usable.len(), max_terms);
        if k_max < max_terms.min(usable.len()) {
            log::warn!(
                "Best-subset search capped at {} terms ({} combinations allowed)",
                k_max,
                self.max_combinations
            );
        }

        let n = y.len();
        let mut per_size: Vec<SubsetModel> = Vec::with_capacity(k_max);
        for k in 1..=k_max {
            let candidates: Vec<Vec<usize>> = combinations(usable.len(), k)
                .into_iter()
                .map(|c| c.into_iter().map(|i| usable[i]).collect())
                .collect();
            let fit = |c: &Vec<usize>| Self::fit_subset(x, y, c);
            let best = if parallel {
                candidates
                    .par_iter()
                    .filter_map(fit)
                    .min_by(better)
            } else {
                candidates.iter().filter_map(fit).min_by(better)
            };
            if let Some(mut model) = best {
                model.score = information_criterion(criterion, n, model.rss, k);
                log::debug!(
                    "Best {}-term subset {:?}: rss {:.4e}, {} {:.4}",
                    k,
                    model.indices,
                    model.rss,
                    criterion,
                    model.score
                );
                per_size.push(model);
            }
        }

        if per_size.is_empty() {
            return Err(FormulabError::SelectionExhausted(
                "best-subset selection".to_string(),
            ));
        }
        let best = per_size
            .iter()
            .enumerate()
            .fold(0, |best, (i, m)| if m.score < per_size[best].score { i } else { best });
        Ok(SubsetSelection { per_size, best })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let mut rng = StdRng::seed_from_u64(9);
        let x = Array2::from_shape_fn((n, 5), |_| rng.gen_range(0.0..3.0));
        let noise: Array1<f64> = (0..n).map(|_| rng.gen_range(-0.01..0.01)).collect();
        let y = x.column(0).mapv(|v| 2.0 * v) + &x.column(3).mapv(|v| -v) + 0.5 + &noise;
        (x, y)
    }

    #[test]
    fn test_combinations_are_lexicographic() {
        assert_eq!(
            combinations(4, 2),
            vec![vec![0, 1], vec![0, 2], vec![0, 3], vec![1, 2], vec![1, 3], vec![2, 3]]
        );
        assert_eq!(combinations(3, 3), vec![vec![0, 1, 2]]);
        assert!(combinations(2, 3).is_empty());
        assert_eq!(binomial(5, 2), 10);
    }

    #[test]
    fn test_finds_true_pair() {
        let (x, y) = data(120);
        let selection = ExhaustiveSelector::default()
            .select(x.view(), y.view(), 3, Criterion::Bic, true)
            .unwrap();
        assert_eq!(selection.per_size.len(), 3);
        let winner = selection.winner();
        assert_eq!(winner.indices, vec![0, 3]);
        assert!((winner.coefficients[0] - 2.0).abs() < 0.01);
        assert!((winner.intercept - 0.5).abs() < 0.02);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (x, y) = data(80);
        let s = ExhaustiveSelector::default();
        let a = s.select(x.view(), y.view(), 3, Criterion::Aic, true).unwrap();
        let b = s.select(x.view(), y.view(), 3, Criterion::Aic, false).unwrap();
        assert_eq!(a.best, b.best);
        for (ma, mb) in a.per_size.iter().zip(&b.per_size) {
            assert_eq!(ma.indices, mb.indices);
            assert_eq!(ma.rss, mb.rss);
        }
    }

    #[test]
    fn test_criteria_penalize_size() {
        let aic = information_criterion(Criterion::Aic, 100, 1.0, 2);
        let bic = information_criterion(Criterion::Bic, 100, 1.0, 2);
        assert!((aic - (100.0 * (0.01f64).ln() + 6.0)).abs() < 1e-9);
        assert!(bic > aic);
        assert!(information_criterion(Criterion::Aic, 10, 0.0, 1).is_finite());
    }

    #[test]
    fn test_budget_caps_model_size() {
        let (x, y) = data(40);
        let s = ExhaustiveSelector { max_combinations: 6 };
        let selection = s.select(x.view(), y.view(), 3, Criterion::Bic, false).unwrap();
        assert_eq!(selection.per_size.len(), 1);
    }
}
