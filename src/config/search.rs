use super::traits::ConfigSection;
use crate::error::{FormulabError, Result};
use crate::types::{StageFlags, StageKind, Unit};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// One operator stage per iteration
    pub operator_stages: Vec<StageKind>,
    /// Number of leading iterations that skip tree screening.
    pub hold: usize,
    pub exact_recovery: bool,
    pub periodic: bool,
    pub reflect_negative: bool,
    pub correlation_screen: bool,
    /// Columns kept by the tree screen, per iteration. Entries for held
    /// iterations are ignored.
    pub screen_sizes: Vec<usize>,
    pub seed: u64,
    pub test_fraction: Option<f64>,
    pub drop_unresolvable: bool,
    /// Feature name to dimension exponent vector.
    pub units: Option<HashMap<String, Vec<f64>>>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            operator_stages: vec![StageKind::Binary, StageKind::Unary],
            hold: 0,
            exact_recovery: false,
            periodic: false,
            reflect_negative: false,
            correlation_screen: true,
            screen_sizes: vec![30, 30],
            seed: 42,
            test_fraction: None,
            drop_unresolvable: true,
            units: None,
        }
    }
}

impl SearchConfig {
    pub fn iterations(&self) -> usize {
        self.operator_stages.len()
    }

    /// Iterations are 1-based.
    pub fn is_held(&self, iteration: usize) -> bool {
        self.hold > 0 && iteration <= self.hold
    }

    pub fn stage_flags(&self) -> StageFlags {
        StageFlags {
            periodic: self.periodic,
            reflect_negative: self.reflect_negative,
        }
    }

    pub fn unit_table(&self) -> Option<HashMap<String, Unit>> {
        self.units.as_ref().map(|units| {
            units
                .iter()
                .map(|(name, exponents)| (name.clone(), Unit(exponents.clone())))
                .collect()
        })
    }
}

impl ConfigSection for SearchConfig {
    fn section_name() -> &'static str {
        "search"
    }

    fn validate(&self) -> Result<()> {
        let iterations = self.iterations();
        if iterations == 0 {
            return Err(FormulabError::Configuration(
                "At least one operator stage is required".to_string(),
            ));
        }
        if self.screen_sizes.len() != iterations {
            return Err(FormulabError::Configuration(format!(
                "screen_sizes has {} entries but there are {} operator stages",
                self.screen_sizes.len(),
                iterations
            )));
        }
        if self.exact_recovery {
            if self.hold < iterations {
                return Err(FormulabError::Configuration(format!(
                    "Exact recovery requires hold ({}) >= iterations ({})",
                    self.hold, iterations
                )));
            }
        } else if self.hold >= iterations {
            return Err(FormulabError::Configuration(format!(
                "hold ({}) must be smaller than the number of iterations ({})",
                self.hold, iterations
            )));
        }
        for (i, &size) in self.screen_sizes.iter().enumerate() {
            if size == 0 && !self.is_held(i + 1) {
                return Err(FormulabError::Configuration(format!(
                    "Screen size for iteration {} must be positive",
                    i + 1
                )));
            }
        }
        if let Some(fraction) = self.test_fraction {
            if !(fraction > 0.0 && fraction < 1.0) {
                return Err(FormulabError::Configuration(
                    "Test fraction must be between 0 and 1".to_string(),
                ));
            }
        }
        if let Some(units) = &self.units {
            let rank = units.values().next().map(|u| u.len()).unwrap_or(0);
            if units.values().any(|u| u.len() != rank || u.iter().any(|e| !e.is_finite())) {
                return Err(FormulabError::Configuration(
                    "Unit exponent vectors must be finite and of equal length".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SearchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_hold_must_leave_a_screened_iteration() {
        let config = SearchConfig {
            hold: 2,
            ..SearchConfig::default()
        };
        assert!(config.validate().is_err());

        let exact = SearchConfig {
            hold: 2,
            exact_recovery: true,
            ..SearchConfig::default()
        };
        assert!(exact.validate().is_ok());
    }

    #[test]
    fn test_exact_recovery_requires_full_hold() {
        let config = SearchConfig {
            hold: 1,
            exact_recovery: true,
            ..SearchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_screen_sizes_must_match_stages() {
        let config = SearchConfig {
            screen_sizes: vec![10],
            ..SearchConfig::default()
        };
        assert!(matches!(config.validate(), Err(FormulabError::Configuration(_))));
    }

    #[test]
    fn test_held_iterations() {
        let config = SearchConfig {
            operator_stages: vec![StageKind::Binary, StageKind::Unary, StageKind::Binary],
            screen_sizes: vec![0, 0, 10],
            hold: 2,
            ..SearchConfig::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.is_held(1) && config.is_held(2));
        assert!(!config.is_held(3));
    }
}
