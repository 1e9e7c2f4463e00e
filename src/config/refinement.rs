use super::traits::ConfigSection;
use crate::error::{FormulabError, Result};
use serde::{Deserialize, Serialize};

/// Bracket and tolerances of the embedded-constant search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    pub lower: f64,
    pub upper: f64,
    /// Constant used to materialize unresolved placeholder columns.
    pub surrogate: f64,
    pub sweeps: usize,
    pub sweep_tolerance: f64,
    pub grid_points: usize,
    pub rel_tolerance: f64,
    pub abs_tolerance: f64,
    pub max_iterations: usize,
    /// Sweep cap of the exact-recovery fit, which keeps sweeping until no
    /// constant moves more than `sweep_tolerance`.
    pub exact_sweeps: usize,
    /// Brent tolerance (relative and absolute) of the exact-recovery fit.
    pub exact_tolerance: f64,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            lower: 0.0,
            upper: 5.0,
            surrogate: 1.0,
            sweeps: 1,
            sweep_tolerance: 1e-12,
            grid_points: 16,
            rel_tolerance: 1e-10,
            abs_tolerance: 1e-12,
            max_iterations: 500,
            exact_sweeps: 50,
            exact_tolerance: 1e-14,
        }
    }
}

impl RefinementConfig {
    /// Settings for the exact-recovery fit: sweeps to convergence with the
    /// tighter Brent tolerance.
    pub fn exact(&self) -> RefinementConfig {
        RefinementConfig {
            sweeps: self.sweeps.max(self.exact_sweeps),
            rel_tolerance: self.rel_tolerance.min(self.exact_tolerance),
            abs_tolerance: self.abs_tolerance.min(self.exact_tolerance),
            ..self.clone()
        }
    }
}

impl ConfigSection for RefinementConfig {
    fn section_name() -> &'static str {
        "refinement"
    }

    fn validate(&self) -> Result<()> {
        if !(self.lower.is_finite() && self.upper.is_finite() && self.lower < self.upper) {
            return Err(FormulabError::Configuration(format!(
                "Refinement bracket [{}, {}] is not a finite interval",
                self.lower, self.upper
            )));
        }
        if !self.surrogate.is_finite() {
            return Err(FormulabError::Configuration(
                "Surrogate constant must be finite".to_string(),
            ));
        }
        if self.sweeps == 0 {
            return Err(FormulabError::Configuration(
                "At least one refinement sweep is required".to_string(),
            ));
        }
        if self.grid_points < 2 {
            return Err(FormulabError::Configuration(
                "Grid must have at least 2 points".to_string(),
            ));
        }
        if self.rel_tolerance <= 0.0
            || self.abs_tolerance <= 0.0
            || self.exact_tolerance <= 0.0
            || self.sweep_tolerance < 0.0
        {
            return Err(FormulabError::Configuration(
                "Refinement tolerances must be positive".to_string(),
            ));
        }
        if self.exact_sweeps == 0 {
            return Err(FormulabError::Configuration(
                "exact_sweeps must be positive".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(FormulabError::Configuration(
                "max_iterations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
