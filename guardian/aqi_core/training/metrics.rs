use ndarray::ArrayView1;

#[allow(clippy::cast_precision_loss)]
fn len_f64(len: usize) -> f64 {
    len as f64
}

/// Root mean squared error.
#[must_use]
pub fn rmse(truth: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let sse: f64 = truth
        .iter()
        .zip(predicted.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    (sse / len_f64(truth.len())).sqrt()
}

/// Mean absolute error.
#[must_use]
pub fn mae(truth: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let sae: f64 = truth
        .iter()
        .zip(predicted.iter())
        .map(|(t, p)| (t - p).abs())
        .sum();
    sae / len_f64(truth.len())
}

/// Coefficient of determination; a constant target yields 1 for a perfect fit, else 0.
#[must_use]
pub fn r2(truth: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let mean = truth.sum() / len_f64(truth.len());
    let ss_tot: f64 = truth.iter().map(|t| (t - mean).powi(2)).sum();
    let ss_res: f64 = truth
        .iter()
        .zip(predicted.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    if ss_tot <= f64::EPSILON {
        return if ss_res <= f64::EPSILON { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Mean and population standard deviation.
#[must_use]
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = len_f64(values.len());
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
