use super::{SparseFit, SparseScreener, Validation};
use crate::config::SelectionConfig;
use crate::error::{FormulabError, Result};
use crate::utils::stats;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// L1-regularized linear screen over a log-spaced regularization path.
///
/// Columns are standardized and the response centered, so the intercept is
/// implicit. Coordinate descent is warm-started from the previous path point.
#[derive(Debug, Clone)]
pub struct LassoScreener {
    pub n_lambdas: usize,
    pub lambda_ratio: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for LassoScreener {
    fn default() -> Self {
        Self::from_config(&SelectionConfig::default())
    }
}

struct Standardized {
    x: Array2<f64>,
    means: Vec<f64>,
    scales: Vec<f64>,
    /// Columns with zero or undefined spread; never enter the model.
    inactive: Vec<bool>,
    y_mean: f64,
    y: Array1<f64>,
}

impl LassoScreener {
    pub fn from_config(config: &SelectionConfig) -> Self {
        Self {
            n_lambdas: config.l1_n_lambdas.max(2),
            lambda_ratio: config.l1_lambda_ratio,
            max_iterations: config.l1_max_iterations,
            tolerance: config.l1_tolerance,
        }
    }

    fn standardize(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Standardized {
        let m = x.ncols();
        let mut z = x.to_owned();
        let mut means = vec![0.0; m];
        let mut scales = vec![1.0; m];
        let mut inactive = vec![false; m];
        for (j, mut column) in z.axis_iter_mut(Axis(1)).enumerate() {
            let view = x.column(j);
            let (mean, sd) = (stats::mean(view), stats::std_dev(view));
            if !stats::is_finite_column(view) || !(sd.is_finite() && sd > 0.0) {
                inactive[j] = true;
                column.fill(0.0);
                continue;
            }
            column.mapv_inplace(|v| (v - mean) / sd);
            means[j] = mean;
            scales[j] = sd;
        }
        let y_mean = stats::mean(y);
        Standardized {
            x: z,
            means,
            scales,
            inactive,
            y_mean,
            y: y.mapv(|v| v - y_mean),
        }
    }

    /// Coordinate descent at one lambda, updating `beta` and `residual` in place.
    fn descend(&self, data: &Standardized, lambda: f64, beta: &mut [f64], residual: &mut Array1<f64>) {
        let n = data.x.nrows() as f64;
        for _ in 0..self.max_iterations {
            let mut max_change: f64 = 0.0;
            for j in 0..beta.len() {
                if data.inactive[j] {
                    continue;
                }
                let column = data.x.column(j);
                let rho = column.dot(&*residual) / n + beta[j];
                let updated = soft_threshold(rho, lambda);
                let delta = updated - beta[j];
                if delta != 0.0 {
                    residual.scaled_add(-delta, &column);
                    beta[j] = updated;
                    max_change = max_change.max(delta.abs());
                }
            }
            if max_change < self.tolerance {
                break;
            }
        }
    }

    /// Back-transform standardized coefficients on `support`.
    fn unscale(data: &Standardized, beta: &[f64], support: &[usize]) -> (Vec<f64>, f64) {
        let coefficients: Vec<f64> = support.iter().map(|&j| beta[j] / data.scales[j]).collect();
        let offset: f64 = support
            .iter()
            .zip(&coefficients)
            .map(|(&j, c)| c * data.means[j])
            .sum();
        (coefficients, data.y_mean - offset)
    }
}

fn soft_threshold(value: f64, lambda: f64) -> f64 {
    if value > lambda {
        value - lambda
    } else if value < -lambda {
        value + lambda
    } else {
        0.0
    }
}

fn predict(x: ArrayView2<'_, f64>, support: &[usize], coefficients: &[f64], intercept: f64) -> Array1<f64> {
    let mut out = Array1::from_elem(x.nrows(), intercept);
    for (&j, &c) in support.iter().zip(coefficients) {
        out.scaled_add(c, &x.column(j));
    }
    out
}

impl SparseScreener for LassoScreener {
    fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        validation: Option<Validation<'_>>,
        max_support: usize,
    ) -> Result<SparseFit> {
        if x.nrows() != y.len() {
            return Err(FormulabError::Computation(format!(
                "Lasso design has {} rows, response {}",
                x.nrows(),
                y.len()
            )));
        }
        let data = Self::standardize(x, y);
        let n = x.nrows() as f64;
        let m = x.ncols();

        let lambda_max = (0..m)
            .filter(|&j| !data.inactive[j])
            .map(|j| data.x.column(j).dot(&data.y).abs() / n)
            .fold(0.0_f64, f64::max);
        if lambda_max <= 0.0 {
            return Ok(SparseFit {
                support: Vec::new(),
                coefficients: Vec::new(),
                intercept: data.y_mean,
                lambda: 0.0,
                rmse: f64::INFINITY,
            });
        }

        let mut beta = vec![0.0; m];
        let mut residual = data.y.clone();
        let mut best: Option<SparseFit> = None;
        // Support of the first path point that overshoots `max_support`,
        // used when no point lands within the limit.
        let mut overshoot: Option<Vec<f64>> = None;

        for k in 0..self.n_lambdas {
            let fraction = k as f64 / (self.n_lambdas - 1) as f64;
            let lambda = lambda_max * self.lambda_ratio.powf(fraction);
            self.descend(&data, lambda, &mut beta, &mut residual);

            let support: Vec<usize> = (0..m).filter(|&j| beta[j] != 0.0).collect();
            if support.is_empty() {
                continue;
            }
            if support.len() > max_support {
                if best.is_none() && overshoot.is_none() {
                    overshoot = Some(beta.clone());
                }
                break;
            }

            let (coefficients, intercept) = Self::unscale(&data, &beta, &support);
            let rmse = match validation {
                Some(v) => stats::rmse(predict(v.x, &support, &coefficients, intercept).view(), v.y),
                None => stats::rmse(predict(x, &support, &coefficients, intercept).view(), y),
            };
            let rmse = if rmse.is_finite() { rmse } else { f64::INFINITY };
            if best.as_ref().map_or(true, |b| rmse < b.rmse) {
                best = Some(SparseFit {
                    support,
                    coefficients,
                    intercept,
                    lambda,
                    rmse,
                });
            }
        }

        if let Some(fit) = best {
            log::debug!(
                "Lasso kept {} columns at lambda {:.3e} (rmse {:.4e})",
                fit.support.len(),
                fit.lambda,
                fit.rmse
            );
            return Ok(fit);
        }

        // Every non-empty support exceeded the limit: keep the largest coefficients.
        let beta = overshoot.unwrap_or(beta);
        let mut ranked: Vec<usize> = (0..m).filter(|&j| beta[j] != 0.0).collect();
        ranked.sort_by(|&a, &b| beta[b].abs().total_cmp(&beta[a].abs()).then(a.cmp(&b)));
        ranked.truncate(max_support);
        ranked.sort_unstable();
        let (coefficients, intercept) = Self::unscale(&data, &beta, &ranked);
        let rmse = stats::rmse(predict(x, &ranked, &coefficients, intercept).view(), y);
        Ok(SparseFit {
            support: ranked,
            coefficients,
            intercept,
            lambda: lambda_max,
            rmse,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn data(n: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let x = Array2::from_shape_fn((n, 6), |_| rng.gen_range(-2.0..2.0));
        let y = x.column(1).mapv(|v| 4.0 * v) - &x.column(4).mapv(|v| 2.0 * v) + 1.0;
        (x, y)
    }

    #[test]
    fn test_recovers_true_support() {
        let (x, y) = data(200, 1);
        let fit = LassoScreener::default().fit(x.view(), y.view(), None, 2).unwrap();
        assert_eq!(fit.support, vec![1, 4]);
        assert!((fit.coefficients[0] - 4.0).abs() < 0.05);
        assert!((fit.intercept - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_support_limit_is_respected() {
        let (x, y) = data(200, 2);
        let fit = LassoScreener::default().fit(x.view(), y.view(), None, 1).unwrap();
        assert_eq!(fit.support, vec![1]);
    }

    #[test]
    fn test_uses_validation_rows() {
        let (x, y) = data(200, 3);
        let (vx, vy) = data(50, 4);
        let validation = Validation {
            x: vx.view(),
            y: vy.view(),
        };
        let fit = LassoScreener::default()
            .fit(x.view(), y.view(), Some(validation), 4)
            .unwrap();
        assert!(fit.support.contains(&1) && fit.support.contains(&4));
        assert!(fit.rmse < 0.05);
    }

    #[test]
    fn test_constant_columns_give_empty_support() {
        let x = Array2::from_elem((10, 2), 3.0);
        let y = Array1::from_iter((0..10).map(|i| i as f64));
        let fit = LassoScreener::default().fit(x.view(), y.view(), None, 2).unwrap();
        assert!(fit.support.is_empty());
    }
}
