use crate::utils::stats::pearson;
use ndarray::{ArrayView1, ArrayView2, Axis};

/// Indices of columns whose correlation with `y` is defined.
pub fn correlation_screen(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Vec<usize> {
    x.axis_iter(Axis(1))
        .enumerate()
        .filter(|(_, column)| !pearson(*column, y).is_nan())
        .map(|(j, _)| j)
        .collect()
}

/// Column indices ordered by decreasing |corr(column, y)|.
///
/// Undefined correlations are left out; ties keep declared order.
pub fn rank_by_correlation(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Vec<usize> {
    let mut scored: Vec<(usize, f64)> = x
        .axis_iter(Axis(1))
        .enumerate()
        .map(|(j, column)| (j, pearson(column, y).abs()))
        .filter(|(_, r)| !r.is_nan())
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.into_iter().map(|(j, _)| j).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_constant_column_is_screened_out() {
        let x = array![[1.0, 5.0, 2.0], [2.0, 5.0, 1.0], [3.0, 5.0, 4.0], [4.0, 5.0, 3.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        assert_eq!(correlation_screen(x.view(), y.view()), vec![0, 2]);
    }

    #[test]
    fn test_ranking_excludes_nan_and_keeps_order_on_ties() {
        let x = array![[1.0, 7.0, -1.0, 1.0], [2.0, 7.0, -2.0, 2.0], [3.0, 7.0, -3.0, 3.5]];
        let y = array![1.0, 2.0, 3.0];
        assert_eq!(rank_by_correlation(x.view(), y.view()), vec![0, 2, 3]);
    }
}
