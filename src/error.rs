use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormulabError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Parse error in '{descriptor}': {message}")]
    Parse { descriptor: String, message: String },

    #[error("Evaluation error: {0}")]
    Eval(String),

    #[error("Optimization error for '{descriptor}': {message}")]
    Optimization { descriptor: String, message: String },

    #[error("No descriptors survived {0}")]
    SelectionExhausted(String),

    #[error("Computation error: {0}")]
    Computation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("Linear algebra error: {0}")]
    Linalg(#[from] linfa_linalg::LinalgError),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl FormulabError {
    pub fn parse(descriptor: &str, message: impl Into<String>) -> Self {
        FormulabError::Parse {
            descriptor: descriptor.to_string(),
            message: message.into(),
        }
    }

    /// Fatal errors abort a run; everything else may be recovered per descriptor.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FormulabError::Configuration(_) | FormulabError::SelectionExhausted(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FormulabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(FormulabError::Configuration("hold".into()).is_fatal());
        assert!(FormulabError::SelectionExhausted("L1 screening".into()).is_fatal());
        assert!(!FormulabError::Eval("unknown variable 'q'".into()).is_fatal());
        assert!(!FormulabError::Optimization {
            descriptor: "log((x+$C))".into(),
            message: "non-finite".into(),
        }
        .is_fatal());
    }
}
