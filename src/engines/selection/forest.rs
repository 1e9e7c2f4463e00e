use super::Screener;
use crate::config::ScreeningConfig;
use crate::error::Result;
use crate::utils::stats;
use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Mixes the tree index into the run seed so trees draw independent streams.
const TREE_SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Bagged regression trees ranked by impurity-decrease importance
#[derive(Debug, Clone)]
pub struct ForestScreener {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub feature_fraction: f64,
    pub sample_fraction: f64,
}

impl Default for ForestScreener {
    fn default() -> Self {
        Self::from_config(&ScreeningConfig::default())
    }
}

impl ForestScreener {
    pub fn from_config(config: &ScreeningConfig) -> Self {
        Self {
            n_trees: config.n_trees,
            max_depth: config.max_depth,
            min_samples_leaf: config.min_samples_leaf.max(1),
            feature_fraction: config.feature_fraction,
            sample_fraction: config.sample_fraction,
        }
    }

    /// Impurity-decrease importance of every column; non-finite columns score 0.
    pub fn importances(&self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, seed: u64) -> Vec<f64> {
        let m = x.ncols();
        let usable: Vec<usize> = (0..m)
            .filter(|&j| stats::is_finite_column(x.column(j)))
            .collect();
        if usable.is_empty() || x.nrows() < 2 {
            return vec![0.0; m];
        }

        let per_tree: Vec<Vec<f64>> = (0..self.n_trees)
            .into_par_iter()
            .map(|t| {
                let stream = (t as u64 + 1).wrapping_mul(TREE_SEED_MIX);
                let mut rng = StdRng::seed_from_u64(seed ^ stream);
                self.grow_tree(x, y, &usable, &mut rng)
            })
            .collect();

        // Summed in tree order so the result does not depend on scheduling.
        let mut total = vec![0.0; m];
        for tree in per_tree {
            for (acc, v) in total.iter_mut().zip(tree) {
                *acc += v;
            }
        }
        total
    }

    fn grow_tree(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        usable: &[usize],
        rng: &mut StdRng,
    ) -> Vec<f64> {
        let n = x.nrows();
        let draws = ((n as f64 * self.sample_fraction).round() as usize).max(2);
        let rows: Vec<usize> = (0..draws).map(|_| rng.gen_range(0..n)).collect();
        let mtry = ((usable.len() as f64 * self.feature_fraction).ceil() as usize)
            .clamp(1, usable.len());

        let mut importance = vec![0.0; x.ncols()];
        let mut features = usable.to_vec();
        let mut stack = vec![(rows, 0usize)];
        while let Some((rows, depth)) = stack.pop() {
            if depth >= self.max_depth || rows.len() < 2 * self.min_samples_leaf {
                continue;
            }
            features.shuffle(rng);
            let Some(split) = self.best_split(x, y, &rows, &features[..mtry]) else {
                continue;
            };
            importance[split.feature] += split.gain;
            let (left, right): (Vec<usize>, Vec<usize>) = rows
                .into_iter()
                .partition(|&r| x[[r, split.feature]] <= split.threshold);
            stack.push((left, depth + 1));
            stack.push((right, depth + 1));
        }
        importance
    }

    fn best_split(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        rows: &[usize],
        features: &[usize],
    ) -> Option<Split> {
        let n = rows.len();
        let total: f64 = rows.iter().map(|&r| y[r]).sum();
        let total_sq: f64 = rows.iter().map(|&r| y[r] * y[r]).sum();
        let parent_sse = total_sq - total * total / n as f64;
        if parent_sse <= 1e-12 * total_sq.max(1.0) {
            return None;
        }

        let mut best: Option<Split> = None;
        let mut order = rows.to_vec();
        for &feature in features {
            order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));
            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for i in 0..n - 1 {
                let r = order[i];
                left_sum += y[r];
                left_sq += y[r] * y[r];
                let left_n = i + 1;
                let right_n = n - left_n;
                if left_n < self.min_samples_leaf || right_n < self.min_samples_leaf {
                    continue;
                }
                let here = x[[r, feature]];
                let next = x[[order[i + 1], feature]];
                if here == next {
                    continue;
                }
                let right_sum = total - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / left_n as f64)
                    + (right_sq - right_sum * right_sum / right_n as f64);
                let gain = parent_sse - sse;
                if gain > 0.0 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(Split {
                        feature,
                        threshold: 0.5 * (here + next),
                        gain,
                    });
                }
            }
        }
        best
    }
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl Screener for ForestScreener {
    fn screen(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        keep: usize,
        seed: u64,
    ) -> Result<Vec<usize>> {
        let importance = self.importances(x, y, seed);
        let mut ranked: Vec<usize> = (0..x.ncols())
            .filter(|&j| stats::is_finite_column(x.column(j)))
            .collect();
        ranked.sort_by(|&a, &b| importance[b].total_cmp(&importance[a]).then(a.cmp(&b)));
        ranked.truncate(keep);
        ranked.sort_unstable();
        log::debug!(
            "Forest screen kept {} of {} columns ({} trees)",
            ranked.len(),
            x.ncols(),
            self.n_trees
        );
        Ok(ranked)
    }
}
