use super::traits::ConfigSection;
use crate::error::{FormulabError, Result};
use serde::{Deserialize, Serialize};

/// Tree-ensemble importance screen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub feature_fraction: f64,
    pub sample_fraction: f64,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 8,
            min_samples_leaf: 5,
            feature_fraction: 0.33,
            sample_fraction: 1.0,
        }
    }
}

impl ConfigSection for ScreeningConfig {
    fn section_name() -> &'static str {
        "screening"
    }

    fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(FormulabError::Configuration(
                "Forest needs at least one tree".to_string(),
            ));
        }
        if self.max_depth == 0 || self.min_samples_leaf == 0 {
            return Err(FormulabError::Configuration(
                "max_depth and min_samples_leaf must be positive".to_string(),
            ));
        }
        if !(self.feature_fraction > 0.0 && self.feature_fraction <= 1.0) {
            return Err(FormulabError::Configuration(
                "Feature fraction must be in (0, 1]".to_string(),
            ));
        }
        if !(self.sample_fraction > 0.0 && self.sample_fraction <= 1.0) {
            return Err(FormulabError::Configuration(
                "Sample fraction must be in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}
