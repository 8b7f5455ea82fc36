//! Activation functions used by the backbone and the classifier
//!
//! - ReLU (f32 version for backbone feature maps)
//! - Softmax / log-sum-exp (f64 version for classifier probabilities)

/// ReLU activation function (f32 version) applied in-place.
///
/// Sets all negative values to 0.0, keeps positive values unchanged.
pub fn relu_inplace(data: &mut [f32]) {
    for value in data.iter_mut() {
        if *value < 0.0 {
            *value = 0.0;
        }
    }
}

/// Numerically stable `ln(sum(exp(row)))`.
pub fn log_sum_exp(row: &[f64]) -> f64 {
    let max_value = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max_value.is_finite() {
        return max_value;
    }
    let sum: f64 = row.iter().map(|&v| (v - max_value).exp()).sum();
    max_value + sum.ln()
}

/// Softmax activation function (f64 version) applied row-wise.
///
/// Converts logits to probabilities for each row. Uses the max-subtraction
/// trick for numerical stability to avoid overflow with large values.
///
/// # Arguments
/// * `outputs` - Flat array containing row-major matrix data
/// * `rows` - Number of rows in the matrix
/// * `cols` - Number of columns in the matrix
pub fn softmax_rows(outputs: &mut [f64], rows: usize, cols: usize) {
    if cols == 0 {
        return;
    }
    assert_eq!(outputs.len(), rows * cols, "outputs length mismatch in softmax_rows");

    for row in outputs.chunks_exact_mut(cols).take(rows) {
        let lse = log_sum_exp(row);
        for value in row.iter_mut() {
            *value = (*value - lse).exp();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-10;

    #[test]
    fn test_relu_inplace() {
        let mut data = vec![-2.0f32, -0.5, 0.0, 0.5, 3.0];
        relu_inplace(&mut data);
        assert_eq!(data, vec![0.0, 0.0, 0.0, 0.5, 3.0]);
    }

    #[test]
    fn test_log_sum_exp_matches_naive() {
        let row = [0.1, -1.2, 2.5];
        let naive = row.iter().map(|v: &f64| v.exp()).sum::<f64>().ln();
        assert!((log_sum_exp(&row) - naive).abs() < EPSILON);
    }

    #[test]
    fn test_log_sum_exp_large_values() {
        let row = [1000.0, 1000.0];
        let expected = 1000.0 + 2.0f64.ln();
        assert!((log_sum_exp(&row) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let mut data = vec![1.0, 2.0, 3.0, -1.0, 0.0, 1.0];
        softmax_rows(&mut data, 2, 3);
        for row in data.chunks_exact(3) {
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < EPSILON);
        }
        assert!(data[2] > data[1] && data[1] > data[0]);
    }

    #[test]
    fn test_softmax_rows_empty_cols() {
        let mut data: Vec<f64> = vec![];
        softmax_rows(&mut data, 3, 0);
        assert!(data.is_empty());
    }
}
