//! Numerical Array Operations and Utilities

use linfa_linalg::eigh::Eigh;
use ndarray::{concatenate, s, Array1, Array2, ArrayView2, Axis};

use crate::error::{AutoMlError, Result};

/// Eigenvalues below this fraction of the largest one are treated as zero.
const PINV_RCOND: f64 = 1e-10;

pub struct NDArrayOperations;

impl NDArrayOperations {
    /// Join column blocks left to right; all blocks must share a row count.
    pub fn concatenate_columns(blocks: &[Array2<f64>]) -> Result<Array2<f64>> {
        if blocks.is_empty() {
            return Err(AutoMlError::shape("Cannot concatenate an empty list of blocks"));
        }
        let views: Vec<ArrayView2<f64>> = blocks.iter().map(|b| b.view()).collect();
        concatenate(Axis(1), &views).map_err(|e| {
            AutoMlError::shape(format!("Feature blocks do not line up: {}", e))
        })
    }

    /// Rows `[start, end)` of a matrix.
    pub fn rows(array: &Array2<f64>, start: usize, end: usize) -> Array2<f64> {
        array.slice(s![start..end, ..]).to_owned()
    }

    /// Append a column of ones so the last weight acts as the bias.
    pub fn with_intercept(array: &Array2<f64>) -> Array2<f64> {
        let mut augmented = Array2::ones((array.nrows(), array.ncols() + 1));
        augmented.slice_mut(s![.., ..array.ncols()]).assign(array);
        augmented
    }

    /// Indicator matrix for category indices; `None` leaves the row all zero.
    pub fn one_hot_encode(categorical: &[Option<usize>], n_categories: usize) -> Array2<f64> {
        let mut one_hot = Array2::zeros((categorical.len(), n_categories));
        for (i, category) in categorical.iter().enumerate() {
            if let Some(category) = category.filter(|&c| c < n_categories) {
                one_hot[(i, category)] = 1.0;
            }
        }
        one_hot
    }

    /// Population mean and standard deviation; zero spread maps to 1.
    pub fn mean_and_scale(values: &Array1<f64>) -> (f64, f64) {
        let mean = values.mean().unwrap_or(0.0);
        let std = values.std(0.0);
        let scale = if std == 0.0 || !std.is_finite() { 1.0 } else { std };
        (mean, scale)
    }

    pub fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|x| 1.0 / (1.0 + (-x).exp()))
    }

    /// Moore-Penrose pseudo-inverse of a symmetric positive semi-definite
    /// matrix such as `XᵀX`. Near-zero eigenvalues are dropped, so singular
    /// design matrices still yield the minimum-norm solution.
    pub fn symmetric_pseudo_inverse(matrix: &Array2<f64>) -> Result<Array2<f64>> {
        let (eigenvalues, eigenvectors) = matrix.eigh().map_err(|e| {
            AutoMlError::shape(format!(
                "Cannot decompose {}x{} matrix: {}",
                matrix.nrows(),
                matrix.ncols(),
                e
            ))
        })?;
        let largest = eigenvalues.iter().fold(0.0f64, |acc, &x| acc.max(x.abs()));
        let cutoff = largest * PINV_RCOND;
        let reciprocals = eigenvalues.mapv(|lambda| {
            if lambda.abs() <= cutoff || lambda == 0.0 {
                0.0
            } else {
                1.0 / lambda
            }
        });

        // V · diag(1/λ) · Vᵀ
        Ok((&eigenvectors * &reciprocals).dot(&eigenvectors.t()))
    }

    /// Squared Euclidean distance between two rows.
    pub fn squared_distance(a: ndarray::ArrayView1<f64>, b: ndarray::ArrayView1<f64>) -> f64 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assert_matrix_close(a: &Array2<f64>, b: &Array2<f64>, tol: f64) {
        assert_eq!(a.dim(), b.dim());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < tol, "{} vs {}", x, y);
        }
    }

    #[test]
    fn test_pseudo_inverse_of_invertible_matrix_is_inverse() {
        let m = array![[4.0, 1.0], [1.0, 3.0]];
        let inv = NDArrayOperations::symmetric_pseudo_inverse(&m).unwrap();
        assert_matrix_close(&m.dot(&inv), &Array2::eye(2), 1e-9);
    }

    #[test]
    fn test_pseudo_inverse_of_singular_matrix() {
        // Rank one: pinv([[1,1],[1,1]]) = [[0.25,0.25],[0.25,0.25]]
        let m = array![[1.0, 1.0], [1.0, 1.0]];
        let inv = NDArrayOperations::symmetric_pseudo_inverse(&m).unwrap();
        assert_matrix_close(&inv, &array![[0.25, 0.25], [0.25, 0.25]], 1e-9);
    }

    #[test]
    fn test_pseudo_inverse_satisfies_penrose_identity() {
        // Rank two in three dimensions
        let m = array![[2.0, -1.0, 1.0], [-1.0, 2.0, 1.0], [1.0, 1.0, 2.0]];
        let inv = NDArrayOperations::symmetric_pseudo_inverse(&m).unwrap();
        assert_matrix_close(&m.dot(&inv).dot(&m), &m, 1e-9);
        assert_matrix_close(&inv.dot(&m).dot(&inv), &inv, 1e-9);
    }

    #[test]
    fn test_pseudo_inverse_needs_square_matrix() {
        let m = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let err = NDArrayOperations::symmetric_pseudo_inverse(&m).unwrap_err();
        assert!(matches!(err, AutoMlError::Shape(_)), "{}", err);
    }

    #[test]
    fn test_concatenate_and_slice() {
        let a = array![[1.0], [2.0], [3.0]];
        let b = array![[0.0, 1.0], [1.0, 0.0], [0.0, 1.0]];
        let joined = NDArrayOperations::concatenate_columns(&[a, b]).unwrap();
        assert_eq!(joined.dim(), (3, 3));
        assert_eq!(NDArrayOperations::rows(&joined, 1, 3).nrows(), 2);

        let short = array![[1.0]];
        let tall = array![[1.0], [2.0]];
        assert!(NDArrayOperations::concatenate_columns(&[short, tall]).is_err());
    }

    #[test]
    fn test_one_hot_encode_leaves_unknown_rows_empty() {
        let encoded = NDArrayOperations::one_hot_encode(&[Some(1), None, Some(0)], 2);
        assert_eq!(encoded, array![[0.0, 1.0], [0.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn test_mean_and_scale() {
        let (mean, scale) = NDArrayOperations::mean_and_scale(&array![1.0, 2.0, 3.0, 4.0]);
        assert!((mean - 2.5).abs() < 1e-12);
        assert!((scale - 1.25f64.sqrt()).abs() < 1e-12);

        let (_, flat) = NDArrayOperations::mean_and_scale(&array![7.0, 7.0]);
        assert_eq!(flat, 1.0);
    }

    #[test]
    fn test_with_intercept() {
        let x = array![[2.0], [3.0]];
        assert_eq!(NDArrayOperations::with_intercept(&x), array![[2.0, 1.0], [3.0, 1.0]]);
    }
}
