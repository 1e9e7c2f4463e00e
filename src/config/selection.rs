use super::traits::ConfigSection;
use crate::error::{FormulabError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Aic,
    Bic,
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Aic => write!(f, "AIC"),
            Criterion::Bic => write!(f, "BIC"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Largest model size considered by best-subset selection.
    pub max_terms: usize,
    pub criterion: Criterion,
    pub parallel: bool,
    pub l1_max_features: usize,
    pub l1_n_lambdas: usize,
    pub l1_lambda_ratio: f64,
    pub l1_max_iterations: usize,
    pub l1_tolerance: f64,
    pub max_combinations: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_terms: 3,
            criterion: Criterion::Bic,
            parallel: true,
            l1_max_features: 20,
            l1_n_lambdas: 100,
            l1_lambda_ratio: 1e-4,
            l1_max_iterations: 1000,
            l1_tolerance: 1e-7,
            max_combinations: 2_000_000,
        }
    }
}

impl ConfigSection for SelectionConfig {
    fn section_name() -> &'static str {
        "selection"
    }

    fn validate(&self) -> Result<()> {
        if self.max_terms == 0 {
            return Err(FormulabError::Configuration(
                "max_terms must be at least 1".to_string(),
            ));
        }
        if self.l1_max_features < self.max_terms {
            return Err(FormulabError::Configuration(format!(
                "l1_max_features ({}) must be at least max_terms ({})",
                self.l1_max_features, self.max_terms
            )));
        }
        if self.l1_n_lambdas < 2 {
            return Err(FormulabError::Configuration(
                "Lasso path needs at least 2 lambdas".to_string(),
            ));
        }
        if !(self.l1_lambda_ratio > 0.0 && self.l1_lambda_ratio < 1.0) {
            return Err(FormulabError::Configuration(
                "l1_lambda_ratio must be between 0 and 1".to_string(),
            ));
        }
        if self.l1_max_iterations == 0 || self.l1_tolerance <= 0.0 {
            return Err(FormulabError::Configuration(
                "Lasso iteration limit and tolerance must be positive".to_string(),
            ));
        }
        if self.max_combinations == 0 {
            return Err(FormulabError::Configuration(
                "max_combinations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
