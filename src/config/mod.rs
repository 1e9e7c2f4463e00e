pub mod manager;
pub mod refinement;
pub mod screening;
pub mod search;
pub mod selection;
pub mod traits;

pub use manager::{AppConfig, ConfigManager};
pub use refinement::RefinementConfig;
pub use screening::ScreeningConfig;
pub use search::SearchConfig;
pub use selection::{Criterion, SelectionConfig};
pub use traits::ConfigSection;
