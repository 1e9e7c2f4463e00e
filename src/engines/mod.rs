pub mod evaluation;
pub mod generation;
pub mod refinement;
pub mod search;
pub mod selection;
