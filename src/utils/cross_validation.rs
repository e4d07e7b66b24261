//! Fold construction for regularization-strength selection.

use crate::error::{ForecastError, Result};

/// One train/test split over row indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Contiguous, unshuffled k-fold splits over `n` rows.
///
/// The first `n % k` folds receive one extra row, so every row lands in
/// exactly one test fold.
pub fn kfold(n: usize, k: usize) -> Result<Vec<Fold>> {
    if k < 2 {
        return Err(ForecastError::InvalidParameter(format!(
            "cross-validation needs at least 2 folds, got {k}"
        )));
    }
    if n < k {
        return Err(ForecastError::InsufficientData { needed: k, got: n });
    }

    let base = n / k;
    let extra = n % k;
    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for f in 0..k {
        let size = base + usize::from(f < extra);
        let end = start + size;
        folds.push(Fold {
            train: (0..start).chain(end..n).collect(),
            test: (start..end).collect(),
        });
        start = end;
    }
    Ok(folds)
}

/// Log-spaced grid of `count` values between `10^lo` and `10^hi`.
pub fn log_grid(lo: f64, hi: f64, count: usize) -> Vec<f64> {
    match count {
        0 => vec![],
        1 => vec![10f64.powf(lo)],
        _ => (0..count)
            .map(|i| 10f64.powf(lo + (hi - lo) * i as f64 / (count - 1) as f64))
            .collect(),
    }
}
