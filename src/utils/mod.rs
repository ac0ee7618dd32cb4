//! Statistics accumulators shared by the training loop

pub mod filter;
pub mod normalize;

pub use filter::RewardForwardFilter;
pub use normalize::RunningMeanStd;

/// Mean of a slice, `0.0` when empty
pub fn mean(values: &[f32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

/// Maximum of a slice, `initial` when empty or when every value is smaller
pub fn max_or(values: &[f32], initial: f64) -> f64 {
    values.iter().fold(initial, |acc, &v| acc.max(v as f64))
}

/// Minimum of a slice, `initial` when empty or when every value is larger
pub fn min_or(values: &[f32], initial: f64) -> f64 {
    values.iter().fold(initial, |acc, &v| acc.min(v as f64))
}

/// Explained variance `1 - Var(y - y_hat) / Var(y)`
///
/// Returns `NaN` when the targets have zero variance.
pub fn explained_variance(predicted: &[f32], targets: &[f32]) -> f64 {
    debug_assert_eq!(predicted.len(), targets.len());
    fn variance(xs: &[f64]) -> f64 {
        let m = xs.iter().sum::<f64>() / xs.len() as f64;
        xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64
    }

    if targets.is_empty() {
        return f64::NAN;
    }
    let ys: Vec<f64> = targets.iter().map(|&y| y as f64).collect();
    let var_y = variance(&ys);
    if var_y == 0.0 {
        return f64::NAN;
    }
    let residuals: Vec<f64> =
        predicted.iter().zip(&ys).map(|(&p, &y)| y - p as f64).collect();
    1.0 - variance(&residuals) / var_y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_helpers() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[1.0, 3.0]), 2.0);
        assert_eq!(max_or(&[], 0.0), 0.0);
        assert_eq!(max_or(&[-3.0, -1.0], 0.0), 0.0);
        assert_eq!(min_or(&[2.0, 5.0], 0.0), 0.0);
        assert_eq!(min_or(&[-2.0, 5.0], 0.0), -2.0);
    }

    #[test]
    fn test_explained_variance() {
        let y = [1.0, 2.0, 3.0, 4.0];
        assert!((explained_variance(&y, &y) - 1.0).abs() < 1e-9);

        let flat = [2.5; 4];
        assert!(explained_variance(&flat, &y).abs() < 1e-9);

        assert!(explained_variance(&y, &[1.0; 4]).is_nan());
    }
}
