use super::{
    refinement::RefinementConfig, screening::ScreeningConfig, search::SearchConfig,
    selection::SelectionConfig, traits::ConfigSection,
};
use crate::error::{FormulabError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Prefix of environment variables that override file settings, e.g.
/// `FORMULAB_SEARCH__HOLD=1`.
pub const ENV_PREFIX: &str = "FORMULAB";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub search: SearchConfig,
    pub refinement: RefinementConfig,
    pub screening: ScreeningConfig,
    pub selection: SelectionConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;
        self.refinement.validate()?;
        self.screening.validate()?;
        self.selection.validate()?;
        Ok(())
    }

    pub fn sections() -> [&'static str; 4] {
        [
            SearchConfig::section_name(),
            RefinementConfig::section_name(),
            ScreeningConfig::section_name(),
            SelectionConfig::section_name(),
        ]
    }
}

pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(AppConfig::default())),
        }
    }

    /// Load a TOML (or JSON) file layered with `FORMULAB_` environment overrides.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(environment())
            .build()?
            .try_deserialize()?;

        config.validate()?;
        log::info!("Loaded configuration from {}", path.display());

        *self.write_lock()? = config;
        Ok(())
    }

    /// Defaults layered with environment overrides only.
    pub fn load_from_env(&self) -> Result<()> {
        let config: AppConfig = config::Config::builder()
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        config.validate()?;
        *self.write_lock()? = config;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_str = toml::to_string_pretty(&self.get()?)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn get(&self) -> Result<AppConfig> {
        self.config
            .read()
            .map(|config| config.clone())
            .map_err(|_| FormulabError::Configuration("Config lock poisoned".to_string()))
    }

    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut updated = self.get()?;
        f(&mut updated);
        updated.validate()?;
        *self.write_lock()? = updated;
        Ok(())
    }

    fn write_lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, AppConfig>> {
        self.config
            .write()
            .map_err(|_| FormulabError::Configuration("Config lock poisoned".to_string()))
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StageKind;

    #[test]
    fn test_round_trip_through_file() {
        let path = std::env::temp_dir().join("formulab_config_round_trip.toml");
        let manager = ConfigManager::new();
        manager
            .update(|c| {
                c.search.operator_stages = vec![StageKind::Binary, StageKind::Unary, StageKind::Union];
                c.search.screen_sizes = vec![10, 12, 14];
                c.selection.max_terms = 2;
            })
            .unwrap();
        manager.save_to_file(&path).unwrap();

        let loaded = ConfigManager::new();
        loaded.load_from_file(&path).unwrap();
        let config = loaded.get().unwrap();
        assert_eq!(config.search.operator_stages.len(), 3);
        assert_eq!(config.search.screen_sizes, vec![10, 12, 14]);
        assert_eq!(config.selection.max_terms, 2);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let path = std::env::temp_dir().join("formulab_config_partial.toml");
        std::fs::write(&path, "[refinement]\nupper = 3.0\n").unwrap();
        let manager = ConfigManager::new();
        manager.load_from_file(&path).unwrap();
        let config = manager.get().unwrap();
        assert_eq!(config.refinement.upper, 3.0);
        assert_eq!(config.refinement.lower, 0.0);
        assert_eq!(config.search.seed, SearchConfig::default().seed);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_invalid_update_is_rejected() {
        let manager = ConfigManager::new();
        let result = manager.update(|c| c.refinement.upper = -1.0);
        assert!(result.is_err());
        assert_eq!(manager.get().unwrap().refinement.upper, 5.0);
    }
}
