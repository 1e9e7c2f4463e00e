//! Dense least squares on top of `linfa-linalg`'s Householder QR.

use crate::error::{FormulabError, Result};
use linfa_linalg::qr::QR;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Column whose distance from the span of earlier columns falls below this
/// fraction of its own norm counts as dependent.
const RANK_TOLERANCE: f64 = 1e-10;

/// Solve `min ||X b - y||` without an intercept.
///
/// Columns that are zero or linearly dependent on earlier columns get
/// coefficient 0 and the rest are solved by QR. Non-finite input is an error.
pub fn least_squares(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
    let (n, m) = x.dim();
    if y.len() != n {
        return Err(FormulabError::Computation(format!(
            "Design has {} rows but response has {}",
            n,
            y.len()
        )));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(FormulabError::Computation(
            "Least squares input contains non-finite values".to_string(),
        ));
    }

    let independent = independent_columns(x)?;
    let mut coefficients = Array1::zeros(m);
    if independent.is_empty() {
        return Ok(coefficients);
    }

    let design = padded(x.select(Axis(1), &independent).view());
    let mut rhs = Array2::zeros((design.nrows(), 1));
    rhs.slice_mut(s![..n, 0]).assign(&y);
    let solution = design.qr()?.solve_into(rhs)?;
    for (k, &j) in independent.iter().enumerate() {
        coefficients[j] = solution[[k, 0]];
    }
    Ok(coefficients)
}

/// Indices of the columns that add rank, in order.
///
/// Unpivoted QR leaves on each diagonal entry of R the distance of that
/// column from the span of the columns before it.
fn independent_columns(x: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
    let norms: Vec<f64> = x.axis_iter(Axis(1)).map(|c| c.dot(&c).sqrt()).collect();
    let nonzero: Vec<usize> = (0..x.ncols()).filter(|&j| norms[j] > 0.0).collect();
    if nonzero.is_empty() {
        return Ok(nonzero);
    }

    let r = padded(x.select(Axis(1), &nonzero).view()).qr()?.into_r();
    Ok(nonzero
        .iter()
        .enumerate()
        .filter(|&(k, &j)| r[[k, k]].abs() > RANK_TOLERANCE * norms[j])
        .map(|(_, &j)| j)
        .collect())
}

/// Append zero rows so the matrix is at least square. Zero rows leave the
/// least-squares problem unchanged.
fn padded(x: ArrayView2<'_, f64>) -> Array2<f64> {
    let (n, m) = x.dim();
    let mut out = Array2::zeros((n.max(m), m));
    out.slice_mut(s![..n, ..]).assign(&x);
    out
}

/// Least squares with a leading intercept column; returns `(intercept, weights)`.
pub fn least_squares_with_intercept(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
) -> Result<(f64, Array1<f64>)> {
    let n = x.nrows();
    let mut design = Array2::<f64>::ones((n, x.ncols() + 1));
    design.slice_mut(s![.., 1..]).assign(&x);
    let beta = least_squares(design.view(), y)?;
    Ok((beta[0], beta.slice(s![1..]).to_owned()))
}

/// Residual sum of squares of `X b` against `y`.
pub fn residual_sum_of_squares(
    x: ArrayView2<'_, f64>,
    coefficients: ArrayView1<'_, f64>,
    y: ArrayView1<'_, f64>,
) -> f64 {
    let fitted = x.dot(&coefficients);
    fitted
        .iter()
        .zip(y.iter())
        .map(|(f, t)| (t - f).powi(2))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_exact_solution() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        let y = array![1.0, 3.0, 5.0, 7.0];
        let b = least_squares(x.view(), y.view()).unwrap();
        assert!((b[0] - 1.0).abs() < 1e-12);
        assert!((b[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_rank_deficient_design() {
        // Third column duplicates the second.
        let x = array![[1.0, 1.0, 1.0], [1.0, 2.0, 2.0], [1.0, 3.0, 3.0], [1.0, 5.0, 5.0]];
        let y = array![2.0, 3.0, 4.0, 6.0];
        let b = least_squares(x.view(), y.view()).unwrap();
        let rss = residual_sum_of_squares(x.view(), b.view(), y.view());
        assert!(rss < 1e-20);
        assert!(b.iter().all(|v| v.is_finite()));
        assert_eq!(b[2], 0.0);
    }

    #[test]
    fn test_zero_column_and_wide_design() {
        let x = array![[0.0, 1.0, 2.0, 3.0], [0.0, 2.0, 1.0, 5.0]];
        let y = array![3.0, 3.0];
        let b = least_squares(x.view(), y.view()).unwrap();
        assert_eq!(b[0], 0.0);
        assert!(residual_sum_of_squares(x.view(), b.view(), y.view()) < 1e-20);
        assert_eq!(b.iter().filter(|v| **v != 0.0).count(), 2);
    }

    #[test]
    fn test_overdetermined_fit_matches_normal_equations() {
        let x = array![[1.0, 0.5], [1.0, 1.5], [1.0, 2.0], [1.0, 4.0], [1.0, 4.5]];
        let y = array![1.2, 1.9, 3.1, 4.8, 5.6];
        let b = least_squares(x.view(), y.view()).unwrap();
        let residual = &y - &x.dot(&b);
        let gradient = x.t().dot(&residual);
        assert!(gradient.iter().all(|g| g.abs() < 1e-10));
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let x = array![[1.0, f64::NAN], [1.0, 2.0]];
        let y = array![1.0, 2.0];
        assert!(least_squares(x.view(), y.view()).is_err());
    }

    #[test]
    fn test_intercept_helper() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![4.0, 6.0, 8.0];
        let (intercept, w) = least_squares_with_intercept(x.view(), y.view()).unwrap();
        assert!((intercept - 4.0).abs() < 1e-12);
        assert!((w[0] - 2.0).abs() < 1e-12);
    }
}
