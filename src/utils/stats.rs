use ndarray::ArrayView1;

pub fn mean(values: ArrayView1<'_, f64>) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sum() / values.len() as f64
}

/// Population standard deviation
pub fn std_dev(values: ArrayView1<'_, f64>) -> f64 {
    let m = mean(values);
    let variance = values.iter().map(|&v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Pearson correlation; NaN when either side has zero variance or is non-finite.
pub fn pearson(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    if a.len() != b.len() || a.len() < 2 {
        return f64::NAN;
    }
    let ma = mean(a);
    let mb = mean(b);
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let dx = x - ma;
        let dy = y - mb;
        cov += dx * dy;
        va += dx * dx;
        vb += dy * dy;
    }
    if va <= 0.0 || vb <= 0.0 || !(va.is_finite() && vb.is_finite()) {
        return f64::NAN;
    }
    cov / (va.sqrt() * vb.sqrt())
}

pub fn rmse(predicted: ArrayView1<'_, f64>, actual: ArrayView1<'_, f64>) -> f64 {
    if predicted.len() != actual.len() || predicted.is_empty() {
        return f64::NAN;
    }
    let sse: f64 = predicted
        .iter()
        .zip(actual.iter())
        .map(|(p, a)| (p - a).powi(2))
        .sum();
    (sse / predicted.len() as f64).sqrt()
}

pub fn is_finite_column(values: ArrayView1<'_, f64>) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// True when every value equals the first (within a relative tolerance).
pub fn is_constant_column(values: ArrayView1<'_, f64>) -> bool {
    match values.first() {
        Some(&first) => {
            let tol = 1e-12 * first.abs().max(1.0);
            values.iter().all(|&v| (v - first).abs() <= tol)
        }
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_pearson_perfect_and_degenerate() {
        let a = array![1.0, 2.0, 3.0, 4.0];
        let b = array![2.0, 4.0, 6.0, 8.0];
        assert!((pearson(a.view(), b.view()) - 1.0).abs() < 1e-12);
        let flat = array![3.0, 3.0, 3.0, 3.0];
        assert!(pearson(a.view(), flat.view()).is_nan());
    }

    #[test]
    fn test_rmse() {
        let p = array![1.0, 2.0, 3.0];
        let a = array![1.0, 2.0, 5.0];
        assert!((rmse(p.view(), a.view()) - (4.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_column_predicates() {
        assert!(is_constant_column(array![2.0, 2.0, 2.0].view()));
        assert!(!is_constant_column(array![2.0, 2.5].view()));
        assert!(!is_finite_column(array![1.0, f64::INFINITY].view()));
        assert!((std_dev(array![1.0, 3.0].view()) - 1.0).abs() < 1e-12);
    }
}
