use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{AqiError, Result};

/// Per-feature affine normalizer: `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Fits column means and population standard deviations.
    ///
    /// Constant columns get a scale of 1 so they map to 0 instead of NaN.
    pub fn fit(matrix: &Array2<f64>) -> Result<Self> {
        if matrix.nrows() == 0 {
            return Err(AqiError::DatasetShape(
                "cannot fit a scaler on zero rows".into(),
            ));
        }
        let mean = matrix
            .mean_axis(Axis(0))
            .ok_or_else(|| AqiError::DatasetShape("cannot fit a scaler on zero rows".into()))?;
        let scale = matrix
            .std_axis(Axis(0), 0.0)
            .mapv(|std| if std > f64::EPSILON && std.is_finite() { std } else { 1.0 });
        Ok(Self { mean, scale })
    }

    /// Fits and transforms in one step.
    pub fn fit_transform(matrix: &Array2<f64>) -> Result<(Self, Array2<f64>)> {
        let scaler = Self::fit(matrix)?;
        let scaled = scaler.transform(matrix)?;
        Ok((scaler, scaled))
    }

    /// Applies the fitted transform without refitting.
    pub fn transform(&self, matrix: &Array2<f64>) -> Result<Array2<f64>> {
        if matrix.ncols() != self.n_features() {
            return Err(AqiError::DimensionMismatch {
                expected: self.n_features(),
                found: matrix.ncols(),
            });
        }
        Ok((matrix - &self.mean) / &self.scale)
    }

    /// Width of the fitted parameter vectors.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Fitted column means.
    #[must_use]
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Fitted column scales.
    #[must_use]
    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn standardizes_columns() {
        let matrix = array![[1.0, 10.0], [3.0, 10.0]];
        let (scaler, scaled) = StandardScaler::fit_transform(&matrix).unwrap();
        assert_eq!(scaler.mean(), &array![2.0, 10.0]);
        assert_eq!(scaler.scale(), &array![1.0, 1.0]);
        assert_eq!(scaled, array![[-1.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn transform_reuses_fitted_parameters() {
        let scaler = StandardScaler::fit(&array![[0.0], [4.0]]).unwrap();
        let scaled = scaler.transform(&array![[6.0]]).unwrap();
        assert_eq!(scaled, array![[2.0]]);
    }

    #[test]
    fn rejects_wrong_width() {
        let scaler = StandardScaler::fit(&array![[0.0, 1.0], [4.0, 2.0]]).unwrap();
        let err = scaler.transform(&array![[1.0, 2.0, 3.0]]).unwrap_err();
        assert!(matches!(
            err,
            AqiError::DimensionMismatch {
                expected: 2,
                found: 3
            }
        ));
    }

    #[test]
    fn zero_rows_cannot_be_fit() {
        let empty = Array2::<f64>::zeros((0, 3));
        assert!(StandardScaler::fit(&empty).is_err());
    }
}
