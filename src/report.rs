use crate::config::Criterion;
use crate::data::PrimitiveMatrix;
use crate::engines::evaluation::build_design_matrix;
use crate::error::{FormulabError, Result};
use crate::types::Descriptor;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// Best model of one size from the final selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub terms: Vec<String>,
    /// Intercept first, then one weight per term.
    pub coefficients: Vec<f64>,
    pub rmse: f64,
    pub score: f64,
}

/// Final outcome of a search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub names: Vec<String>,
    /// Selected descriptors as trees, one per name. Prediction evaluates
    /// these rather than re-parsing the printed names.
    pub terms: Vec<Descriptor>,
    /// Training-set column of each selected descriptor.
    pub columns: Vec<Vec<f64>>,
    /// Intercept first, then one weight per name.
    pub coefficients: Vec<f64>,
    /// Embedded constant of each selected descriptor, if it carries one.
    pub constants: Vec<Option<f64>>,
    pub generation_sizes: Vec<usize>,
    pub selection_sizes: Vec<Option<usize>>,
    pub train_rmse: f64,
    pub test_rmse: Option<f64>,
    pub runtime_seconds: f64,
    pub models: Vec<ModelSummary>,
    pub criterion: Option<Criterion>,
    pub exact_recovery: bool,
    pub timestamp: String,
}

impl RunReport {
    pub fn intercept(&self) -> f64 {
        self.coefficients.first().copied().unwrap_or(0.0)
    }

    pub fn weights(&self) -> &[f64] {
        self.coefficients.get(1..).unwrap_or(&[])
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.terms
    }

    /// `y = c0 + c1*d1 + ...`
    pub fn formula(&self) -> String {
        let mut out = format!("y = {}", self.intercept());
        for (name, w) in self.names.iter().zip(self.weights()) {
            if *w < 0.0 {
                let _ = write!(out, " - {}*{}", -w, name);
            } else {
                let _ = write!(out, " + {}*{}", w, name);
            }
        }
        out
    }

    /// Evaluate the selected formula on new primitive rows.
    pub fn predict(&self, primitives: &PrimitiveMatrix) -> Result<Array1<f64>> {
        if self.terms.iter().any(|d| d.is_unresolved()) {
            return Err(FormulabError::Eval(
                "Report contains unresolved placeholders".to_string(),
            ));
        }
        let constants = vec![0.0; self.terms.len()];
        let design = build_design_matrix(&self.terms, &constants, primitives)?;
        let weights = Array1::from(self.weights().to_vec());
        Ok(design.dot(&weights) + self.intercept())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable run log.
    pub fn render_log(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "formulab run log ({})", self.timestamp);
        let _ = writeln!(out, "runtime: {:.3} s", self.runtime_seconds);
        if self.exact_recovery {
            let _ = writeln!(out, "mode: exact recovery");
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "iteration  generated  selected");
        for (i, generated) in self.generation_sizes.iter().enumerate() {
            let selected = match self.selection_sizes.get(i).copied().flatten() {
                Some(n) => n.to_string(),
                None => "-".to_string(),
            };
            let _ = writeln!(out, "{:>9}  {:>9}  {:>8}", i + 1, generated, selected);
        }
        let _ = writeln!(out);

        if !self.models.is_empty() {
            let criterion = self
                .criterion
                .map(|c| c.to_string())
                .unwrap_or_else(|| "score".to_string());
            let _ = writeln!(out, "best model per size ({}):", criterion);
            for model in &self.models {
                let _ = writeln!(
                    out,
                    "  {} term(s): rmse {:.6e}, {} {:.4}  [{}]",
                    model.terms.len(),
                    model.rmse,
                    criterion,
                    model.score,
                    model.terms.join(", ")
                );
            }
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "selected: {}", self.formula());
        let _ = writeln!(out, "train rmse: {:.6e}", self.train_rmse);
        if let Some(test) = self.test_rmse {
            let _ = writeln!(out, "test rmse: {:.6e}", test);
        }
        out
    }

    pub fn write_log<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.render_log())?;
        Ok(())
    }
}
