//! Screening and final-model selection behind swappable traits.

pub mod correlation;
pub mod forest;
pub mod lasso;
pub mod subset;

pub use correlation::{correlation_screen, rank_by_correlation};
pub use forest::ForestScreener;
pub use lasso::LassoScreener;
pub use subset::ExhaustiveSelector;

use crate::config::Criterion;
use crate::error::Result;
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Importance screen retaining the `keep` most useful columns.
pub trait Screener: Send + Sync {
    /// Returns retained column indices in ascending order.
    fn screen(&self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, keep: usize, seed: u64)
        -> Result<Vec<usize>>;
}

/// Held-out rows used to choose a sparse model.
#[derive(Debug, Clone, Copy)]
pub struct Validation<'a> {
    pub x: ArrayView2<'a, f64>,
    pub y: ArrayView1<'a, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseFit {
    /// Ascending column indices with non-zero coefficients
    pub support: Vec<usize>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub lambda: f64,
    pub rmse: f64,
}

pub trait SparseScreener: Send + Sync {
    fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        validation: Option<Validation<'_>>,
        max_support: usize,
    ) -> Result<SparseFit>;
}

/// Best model of one size
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsetModel {
    pub indices: Vec<usize>,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub rss: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsetSelection {
    /// One entry per model size, ascending.
    pub per_size: Vec<SubsetModel>,
    /// Index into `per_size` of the criterion winner.
    pub best: usize,
}

impl SubsetSelection {
    pub fn winner(&self) -> &SubsetModel {
        &self.per_size[self.best]
    }
}

pub trait SubsetSelector: Send + Sync {
    fn select(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        max_terms: usize,
        criterion: Criterion,
        parallel: bool,
    ) -> Result<SubsetSelection>;
}
