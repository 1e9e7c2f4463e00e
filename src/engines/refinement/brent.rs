//! Bounded scalar minimization through argmin's `BrentOpt`.

use argmin::core::{CostFunction, Error as ArgminError, Executor, State};
use argmin::solver::brent::BrentOpt;
use std::cell::RefCell;

#[derive(Debug, Clone, Copy)]
pub struct BrentSettings {
    pub rel_tolerance: f64,
    pub abs_tolerance: f64,
    pub max_iterations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum {
    pub x: f64,
    pub value: f64,
    pub evaluations: usize,
}

/// Scalar objective adapted to argmin's `&self` cost interface.
struct ScalarObjective<F> {
    f: RefCell<F>,
}

impl<F> CostFunction for ScalarObjective<F>
where
    F: FnMut(f64) -> f64,
{
    type Param = f64;
    type Output = f64;

    fn cost(&self, x: &f64) -> Result<f64, ArgminError> {
        let mut f = self.f.borrow_mut();
        let value = (*f)(*x);
        Ok(if value.is_finite() { value } else { f64::INFINITY })
    }
}

/// Minimize `f` on the open interval `(lower, upper)`.
///
/// Non-finite objective values count as `+inf`, which steers the solver to
/// golden-section steps. Returns `None` when argmin fails or never records a
/// best point.
pub fn minimize_bounded<F>(f: F, lower: f64, upper: f64, settings: &BrentSettings) -> Option<Minimum>
where
    F: FnMut(f64) -> f64,
{
    let (a, b) = if lower <= upper { (lower, upper) } else { (upper, lower) };
    let solver = BrentOpt::new(a, b).set_tolerance(settings.rel_tolerance, settings.abs_tolerance);
    let problem = ScalarObjective { f: RefCell::new(f) };

    let result = Executor::new(problem, solver)
        .configure(|state| state.max_iters(settings.max_iterations as u64))
        .run();
    let result = match result {
        Ok(result) => result,
        Err(e) => {
            log::debug!("Brent search on [{}, {}] failed: {}", a, b, e);
            return None;
        }
    };

    let state = result.state();
    let x = state.get_best_param().copied()?;
    let evaluations = state
        .get_func_counts()
        .get("cost_count")
        .copied()
        .unwrap_or(0) as usize;
    Some(Minimum {
        x,
        value: state.get_best_cost(),
        evaluations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BrentSettings {
        BrentSettings {
            rel_tolerance: 1e-12,
            abs_tolerance: 1e-14,
            max_iterations: 200,
        }
    }

    #[test]
    fn test_quadratic_minimum() {
        let m = minimize_bounded(|x| (x - 1.3).powi(2) + 2.0, 0.0, 5.0, &settings()).unwrap();
        assert!((m.x - 1.3).abs() < 1e-6);
        assert!((m.value - 2.0).abs() < 1e-12);
        assert!(m.evaluations > 0);
    }

    #[test]
    fn test_kinked_minimum() {
        let m = minimize_bounded(|x: f64| (x - 0.3).abs(), 0.0, 1.0, &settings()).unwrap();
        assert!((m.x - 0.3).abs() < 1e-10);
    }

    #[test]
    fn test_minimum_at_bound_approaches_edge() {
        let m = minimize_bounded(|x| -x, 0.0, 2.0, &settings()).unwrap();
        assert!(m.x > 2.0 - 1e-6 && m.x <= 2.0);
    }

    #[test]
    fn test_infinite_region_is_avoided() {
        let m = minimize_bounded(
            |x| if x < 0.5 { f64::NAN } else { (x - 0.8).powi(2) },
            0.0,
            1.0,
            &settings(),
        )
        .unwrap();
        assert!((m.x - 0.8).abs() < 1e-6);
    }
}
