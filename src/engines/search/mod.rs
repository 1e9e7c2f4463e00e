pub mod engine;
pub mod pipeline;
pub mod progress;

pub use engine::SearchEngine;
pub use pipeline::{drop_failed, resolve_pending, OnFailure, Scope};
pub use progress::{ChannelProgressCallback, ConsoleProgressCallback, ProgressCallback, ProgressMessage};
