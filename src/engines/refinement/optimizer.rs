use super::brent::{minimize_bounded, BrentSettings, Minimum};
use crate::config::RefinementConfig;
use crate::data::PrimitiveMatrix;
use crate::engines::evaluation::{build_design_matrix, current_constants};
use crate::error::{FormulabError, Result};
use crate::types::Descriptor;
use crate::utils::{least_squares, stats};
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Outcome of a refinement pass over one descriptor set.
#[derive(Debug, Clone)]
pub struct RefinementResult {
    /// Input descriptors with refined placeholders resolved. Failed
    /// descriptors are returned as given.
    pub descriptors: Vec<Descriptor>,
    /// Per-descriptor constant, exactly 0 for descriptors without a placeholder.
    pub constants: Vec<f64>,
    pub weights: Array1<f64>,
    /// Always 0: the bias column, when present, carries the offset.
    pub intercept: f64,
    pub rmse: f64,
    pub columns: Array2<f64>,
    pub failed: Vec<String>,
}

impl RefinementResult {
    pub fn is_failed(&self, index: usize) -> bool {
        self.failed.contains(&self.descriptors[index].to_string())
    }
}

/// Jointly estimate embedded constants and linear weights.
///
/// Constants are searched one descriptor at a time in declared order with
/// every other constant held; each trial rebuilds the full design matrix and
/// refits ordinary least squares without intercept. `sweeps` passes are made,
/// stopping early once no constant moves by more than `sweep_tolerance`.
pub fn refine(
    descriptors: &[Descriptor],
    primitives: &PrimitiveMatrix,
    y: ArrayView1<'_, f64>,
    settings: &RefinementConfig,
) -> Result<RefinementResult> {
    if y.len() != primitives.n_rows() {
        return Err(FormulabError::Computation(format!(
            "Response has {} rows but primitives have {}",
            y.len(),
            primitives.n_rows()
        )));
    }

    let mut constants = current_constants(descriptors, settings.surrogate);
    let targets: Vec<usize> = descriptors
        .iter()
        .enumerate()
        .filter(|(_, d)| d.has_placeholder())
        .map(|(j, _)| j)
        .collect();
    let mut failed: Vec<usize> = Vec::new();

    for sweep in 0..settings.sweeps {
        let mut max_shift: f64 = 0.0;
        for &j in &targets {
            if failed.contains(&j) {
                continue;
            }
            let mut trial = constants.clone();
            let objective = |c: f64| {
                trial[j] = c;
                trial_rmse(descriptors, &trial, j, primitives, y)
            };
            match search_constant(&descriptors[j].to_string(), objective, settings) {
                Ok(minimum) => {
                    log::debug!(
                        "Sweep {}: '{}' -> C = {} (rmse {:.3e}, {} evaluations)",
                        sweep + 1,
                        descriptors[j],
                        minimum.x,
                        minimum.value,
                        minimum.evaluations
                    );
                    max_shift = max_shift.max((minimum.x - constants[j]).abs());
                    constants[j] = minimum.x;
                }
                Err(e) if !e.is_fatal() => {
                    log::warn!("{}; keeping constant {}", e, constants[j]);
                    failed.push(j);
                }
                Err(e) => return Err(e),
            }
        }
        if max_shift <= settings.sweep_tolerance {
            log::debug!("Refinement converged after {} sweep(s)", sweep + 1);
            break;
        }
    }

    let resolved: Vec<Descriptor> = descriptors
        .iter()
        .enumerate()
        .map(|(j, d)| {
            if d.has_placeholder() && !failed.contains(&j) {
                d.with_constant(constants[j])
            } else {
                d.clone()
            }
        })
        .collect();
    let columns = build_design_matrix(descriptors, &constants, primitives)?;

    let usable: Vec<usize> = (0..descriptors.len())
        .filter(|j| !failed.contains(j) && stats::is_finite_column(columns.column(*j)))
        .collect();
    let design = columns.select(Axis(1), &usable);
    let fitted = least_squares(design.view(), y)?;
    let mut weights = Array1::zeros(descriptors.len());
    for (k, &j) in usable.iter().enumerate() {
        weights[j] = fitted[k];
    }
    let rmse = stats::rmse(design.dot(&fitted).view(), y);

    Ok(RefinementResult {
        failed: failed.iter().map(|&j| descriptors[j].to_string()).collect(),
        descriptors: resolved,
        constants,
        weights,
        intercept: 0.0,
        rmse,
        columns,
    })
}

/// RMSE of the least-squares fit with descriptor `target` at the trial constant.
///
/// Other descriptors whose columns are non-finite are left out of the fit;
/// a non-finite target column or a failed fit scores `+inf`.
fn trial_rmse(
    descriptors: &[Descriptor],
    constants: &[f64],
    target: usize,
    primitives: &PrimitiveMatrix,
    y: ArrayView1<'_, f64>,
) -> f64 {
    let Ok(design) = build_design_matrix(descriptors, constants, primitives) else {
        return f64::INFINITY;
    };
    if !stats::is_finite_column(design.column(target)) {
        return f64::INFINITY;
    }
    let usable: Vec<usize> = (0..design.ncols())
        .filter(|&j| j == target || stats::is_finite_column(design.column(j)))
        .collect();
    let design = design.select(Axis(1), &usable);
    match least_squares(design.view(), y) {
        Ok(beta) => {
            let value = stats::rmse(design.dot(&beta).view(), y);
            if value.is_finite() {
                value
            } else {
                f64::INFINITY
            }
        }
        Err(_) => f64::INFINITY,
    }
}

/// Grid scan over `[lower, upper]` followed by argmin's Brent on the best
/// grid cell.
///
/// The better of the Brent result and the best grid point is returned, so a
/// minimum outside the bracket lands exactly on the nearest bound.
pub fn search_constant<F>(name: &str, mut objective: F, settings: &RefinementConfig) -> Result<Minimum>
where
    F: FnMut(f64) -> f64,
{
    let points = settings.grid_points.max(2);
    let step = (settings.upper - settings.lower) / (points - 1) as f64;
    let grid: Vec<f64> = (0..points)
        .map(|k| {
            if k == points - 1 {
                settings.upper
            } else {
                settings.lower + step * k as f64
            }
        })
        .collect();
    let values: Vec<f64> = grid.iter().map(|&c| sanitize(objective(c))).collect();

    let best = values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold(None, |best: Option<(usize, f64)>, (k, &v)| match best {
            Some((_, bv)) if bv <= v => best,
            _ => Some((k, v)),
        });
    let Some((k, grid_value)) = best else {
        return Err(FormulabError::Optimization {
            descriptor: name.to_string(),
            message: format!(
                "objective is non-finite over [{}, {}]",
                settings.lower, settings.upper
            ),
        });
    };

    let low = grid[k.saturating_sub(1)];
    let high = grid[(k + 1).min(points - 1)];
    let brent = minimize_bounded(
        |c| sanitize(objective(c)),
        low,
        high,
        &BrentSettings {
            rel_tolerance: settings.rel_tolerance,
            abs_tolerance: settings.abs_tolerance,
            max_iterations: settings.max_iterations,
        },
    );

    let evaluations = points + brent.map_or(0, |m| m.evaluations);
    match brent {
        Some(brent) if brent.value < grid_value => Ok(Minimum {
            evaluations,
            ..brent
        }),
        _ => Ok(Minimum {
            x: grid[k],
            value: grid_value,
            evaluations,
        }),
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::evaluation::parser::parse_descriptor;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sample(n: usize, seed: u64) -> PrimitiveMatrix {
        let mut rng = StdRng::seed_from_u64(seed);
        let values = Array2::from_shape_fn((n, 2), |_| rng.gen_range(0.1..5.0));
        PrimitiveMatrix::new(vec!["x1".into(), "x2".into()], values).unwrap()
    }

    fn tight() -> RefinementConfig {
        RefinementConfig {
            sweeps: 10,
            sweep_tolerance: 1e-14,
            rel_tolerance: 1e-14,
            abs_tolerance: 1e-14,
            max_iterations: 200,
            ..RefinementConfig::default()
        }
    }

    #[test]
    fn test_recovers_single_constant() {
        let p = sample(300, 1);
        let y = p.column("x1").unwrap().mapv(|x| 3.0 * (x + 0.7).ln() + 0.5);
        let descriptors = vec![Descriptor::bias(), parse_descriptor("log((x1+$C))").unwrap()];
        let result = refine(&descriptors, &p, y.view(), &tight()).unwrap();

        assert!(result.failed.is_empty());
        assert_eq!(result.constants[0], 0.0);
        assert!((result.constants[1] - 0.7).abs() < 1e-6);
        assert!((result.weights[1] - 3.0).abs() < 1e-5);
        assert!((result.weights[0] - 0.5).abs() < 1e-5);
        assert_eq!(result.intercept, 0.0);
        assert_eq!(result.descriptors[1].resolved_constant(), Some(result.constants[1]));
    }

    #[test]
    fn test_constant_beyond_bracket_lands_on_bound() {
        let p = sample(200, 2);
        let y = p.column("x2").unwrap().mapv(|x| (x + 8.0).ln());
        let descriptors = vec![Descriptor::bias(), parse_descriptor("log((x2+$C))").unwrap()];
        let result = refine(&descriptors, &p, y.view(), &tight()).unwrap();
        assert_eq!(result.constants[1], 5.0);
    }

    #[test]
    fn test_everywhere_invalid_bracket_is_recorded_as_failure() {
        let p = sample(50, 3);
        let y = p.column("x1").unwrap().to_owned();
        // The shifted argument is negative on every row for any C in [0, 5].
        let descriptors = vec![
            Descriptor::bias(),
            parse_descriptor("log(((-x1*100)+$C))").unwrap(),
        ];
        let result = refine(&descriptors, &p, y.view(), &RefinementConfig::default()).unwrap();
        assert_eq!(result.failed.len(), 1);
        assert!(result.is_failed(1));
        assert_eq!(result.weights[1], 0.0);
        assert!(result.descriptors[1].is_unresolved());
    }

    #[test]
    fn test_search_constant_prefers_grid_endpoint() {
        let m = search_constant("scan", |c| 10.0 - c, &RefinementConfig::default()).unwrap();
        assert_eq!(m.x, 5.0);
        let err = search_constant("scan", |_| f64::NAN, &RefinementConfig::default());
        assert!(matches!(err, Err(FormulabError::Optimization { .. })));
    }
}
