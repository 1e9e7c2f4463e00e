pub mod linalg;
pub mod stats;

pub use linalg::{least_squares, least_squares_with_intercept, residual_sum_of_squares};
pub use stats::{pearson, rmse};
