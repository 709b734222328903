// src/distribution.rs

//! The capability contract shared by all probabilistic models in the crate.

use crate::error::{IsaError, Result};
use ndarray::{Array1, Array2};
use rand::RngCore;
use std::f64::consts::LN_2;

/// A probability density over `dim()`-dimensional column vectors.
///
/// Data matrices hold one sample per column. The trait is object safe, so
/// callers that work with any model can hold a `&dyn Distribution`.
pub trait Distribution {
    /// Dimensionality of the modeled data.
    fn dim(&self) -> usize;

    /// Log-density of every column of `data`.
    fn log_likelihood(&self, data: &Array2<f64>) -> Result<Array1<f64>>;

    /// Negative log-density of every column of `data`. Implementations may
    /// omit the normalization constant.
    fn energy(&self, data: &Array2<f64>) -> Result<Array1<f64>>;

    /// Draw `num_samples` samples, one per column.
    fn sample(&self, num_samples: usize, rng: &mut dyn RngCore) -> Result<Array2<f64>>;

    /// Average code length of `data` in bits per dimension.
    fn evaluate(&self, data: &Array2<f64>) -> Result<f64> {
        let log_lik = self.log_likelihood(data)?;
        let mean = log_lik
            .mean()
            .ok_or_else(|| IsaError::invalid("cannot evaluate an empty data set"))?;
        Ok(-mean / LN_2 / self.dim() as f64)
    }
}

/// Check that `data` is a non-empty, finite matrix with `dim` rows.
pub(crate) fn check_data(data: &Array2<f64>, dim: usize) -> Result<()> {
    if data.ncols() == 0 {
        return Err(IsaError::invalid("data must contain at least one sample"));
    }
    if data.nrows() != dim {
        return Err(IsaError::invalid(format!(
            "data has {} rows, expected {}",
            data.nrows(),
            dim
        )));
    }
    if data.iter().any(|v| !v.is_finite()) {
        return Err(IsaError::invalid("data must not contain NaN or infinite values"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use crate::utils::sample_normal;

    /// Standard normal density, used to exercise the provided methods.
    struct UnitGaussian {
        dim: usize,
    }

    impl Distribution for UnitGaussian {
        fn dim(&self) -> usize {
            self.dim
        }

        fn log_likelihood(&self, data: &Array2<f64>) -> Result<Array1<f64>> {
            check_data(data, self.dim)?;
            let norm = 0.5 * self.dim as f64 * (2.0 * std::f64::consts::PI).ln();
            Ok(data.map_axis(ndarray::Axis(0), |c| -0.5 * c.dot(&c) - norm))
        }

        fn energy(&self, data: &Array2<f64>) -> Result<Array1<f64>> {
            Ok(-self.log_likelihood(data)?)
        }

        fn sample(&self, num_samples: usize, rng: &mut dyn RngCore) -> Result<Array2<f64>> {
            Ok(sample_normal(self.dim, num_samples, rng))
        }
    }

    #[test]
    fn test_evaluate_is_bits_per_dimension() {
        let model = UnitGaussian { dim: 2 };
        let data = array![[0.0, 1.0, -0.5], [2.0, 0.0, 0.3]];

        let log_lik = model.log_likelihood(&data).unwrap();
        let expected = -log_lik.mean().unwrap() / LN_2 / 2.0;
        assert_eq!(model.evaluate(&data).unwrap(), expected);
    }

    #[test]
    fn test_dyn_dispatch() {
        let model: Box<dyn Distribution> = Box::new(UnitGaussian { dim: 1 });
        let data = array![[0.0]];
        // entropy of N(0, 1) evaluated at its mode
        let bits = model.evaluate(&data).unwrap();
        let expected = 0.5 * (2.0 * std::f64::consts::PI).ln() / 2.0_f64.ln();
        assert!((bits - expected).abs() < 1e-12);
    }

    #[test]
    fn test_check_data() {
        assert!(check_data(&Array2::zeros((2, 0)), 2).is_err());
        assert!(check_data(&Array2::zeros((3, 5)), 2).is_err());
        assert!(check_data(&array![[f64::NAN]], 1).is_err());
        assert!(check_data(&Array2::zeros((2, 5)), 2).is_ok());
    }
}
