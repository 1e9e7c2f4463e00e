pub mod brent;
pub mod optimizer;

pub use brent::{minimize_bounded, BrentSettings, Minimum};
pub use optimizer::{refine, search_constant, RefinementResult};
