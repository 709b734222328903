// src/gsm.rs

//! Gaussian scale mixtures.
//!
//! A GSM is a finite mixture of zero-mean, isotropic Gaussians that differ
//! only in their variance:
//!
//! ```text
//! p(x) = Σₖ wₖ N(x; 0, sₖ I)
//! ```
//!
//! Mixing several scales yields heavy-tailed, sparse densities, which makes
//! the GSM a flexible prior for the subspaces of an ISA model.

use crate::distribution::{check_data, Distribution};
use crate::error::{IsaError, Result};
use crate::utils::{logsumexp, sample_categorical, sample_normal};

use ndarray::{Array1, Array2, Axis};
use rand::RngCore;
use std::f64::consts::PI;
use tracing::debug;

/// Total responsibility below which a component keeps its previous scale.
const MIN_RESPONSIBILITY: f64 = 1e-300;

/// Zero-mean Gaussian scale mixture over `dim`-dimensional vectors.
#[derive(Clone, Debug)]
pub struct Gsm {
    dim: usize,
    scales: Array1<f64>,
    weights: Array1<f64>,
}

impl Gsm {
    /// Create a GSM with log-spaced scales, uniform weights and unit variance.
    pub fn new(dim: usize, num_scales: usize) -> Result<Self> {
        if dim == 0 {
            return Err(IsaError::invalid("GSM dimensionality must be positive"));
        }
        if num_scales == 0 {
            return Err(IsaError::invalid("GSM needs at least one scale"));
        }

        let scales = if num_scales == 1 {
            Array1::ones(1)
        } else {
            Array1::linspace(-2.0, 2.0, num_scales).mapv(f64::exp)
        };
        let weights = Array1::from_elem(num_scales, 1.0 / num_scales as f64);

        let mut gsm = Self {
            dim,
            scales,
            weights,
        };
        gsm.normalize()?;
        Ok(gsm)
    }

    /// Number of mixture components.
    pub fn num_scales(&self) -> usize {
        self.scales.len()
    }

    /// Variances of the mixture components.
    pub fn scales(&self) -> &Array1<f64> {
        &self.scales
    }

    /// Replace the component variances. Mixing weights are left unchanged.
    pub fn set_scales(&mut self, scales: Array1<f64>) -> Result<()> {
        if scales.len() != self.num_scales() {
            return Err(IsaError::invalid(format!(
                "expected {} scales, got {}",
                self.num_scales(),
                scales.len()
            )));
        }
        if scales.iter().any(|&s| !(s > 0.0) || !s.is_finite()) {
            return Err(IsaError::invalid("scales must be positive and finite"));
        }
        self.scales = scales;
        Ok(())
    }

    /// Mixing weights of the components.
    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    /// Replace the mixing weights. They must be non-negative and sum to one.
    pub fn set_weights(&mut self, weights: Array1<f64>) -> Result<()> {
        if weights.len() != self.num_scales() {
            return Err(IsaError::invalid(format!(
                "expected {} weights, got {}",
                self.num_scales(),
                weights.len()
            )));
        }
        if weights.iter().any(|&w| !(w >= 0.0)) || (weights.sum() - 1.0).abs() > 1e-8 {
            return Err(IsaError::invalid(
                "weights must be non-negative and sum to one",
            ));
        }
        self.weights = weights;
        Ok(())
    }

    /// Marginal variance of each coordinate, `Σₖ wₖ sₖ`.
    pub fn variance(&self) -> Result<f64> {
        let variance = self.weights.dot(&self.scales);
        if !(variance > 0.0) || !variance.is_finite() {
            return Err(IsaError::numerical(format!(
                "degenerate GSM variance: {}",
                variance
            )));
        }
        Ok(variance)
    }

    /// Rescale all components so that the marginal variance is one.
    pub fn normalize(&mut self) -> Result<()> {
        let variance = self.variance()?;
        self.scales /= variance;
        Ok(())
    }

    /// Squared Euclidean norm of every column.
    fn squared_norms(data: &Array2<f64>) -> Array1<f64> {
        data.map_axis(Axis(0), |column| column.dot(&column))
    }

    /// Joint log-density `ln wₖ + ln N(xₙ; 0, sₖ I)` as a `num_scales × n` matrix.
    fn log_joint(&self, sq_norms: &Array1<f64>) -> Array2<f64> {
        let half_dim = 0.5 * self.dim as f64;
        Array2::from_shape_fn((self.num_scales(), sq_norms.len()), |(k, n)| {
            let s = self.scales[k];
            self.weights[k].ln() - half_dim * (2.0 * PI * s).ln() - sq_norms[n] / (2.0 * s)
        })
    }

    /// Responsibilities and per-sample log-likelihoods.
    fn e_step(&self, sq_norms: &Array1<f64>) -> (Array2<f64>, Array1<f64>) {
        let mut log_joint = self.log_joint(sq_norms);
        let log_lik = logsumexp(&log_joint);
        for (mut column, &norm) in log_joint.columns_mut().into_iter().zip(log_lik.iter()) {
            column.mapv_inplace(|v| (v - norm).exp());
        }
        (log_joint, log_lik)
    }

    /// Fit scales and mixing weights by expectation maximization.
    ///
    /// Each row of `data` is treated as one coordinate of an isotropic
    /// sample. Iterates until both the change in average log-likelihood and
    /// the largest change of any scale fall below `tol`, or for at most
    /// `max_iter` iterations.
    ///
    /// # Returns
    /// * `true` if the fit converged, `false` if it hit `max_iter`
    pub fn train(&mut self, data: &Array2<f64>, max_iter: usize, tol: f64) -> Result<bool> {
        check_data(data, self.dim)?;

        let num_samples = data.ncols() as f64;
        let dim = self.dim as f64;
        let sq_norms = Self::squared_norms(data);

        let (mut post, log_lik) = self.e_step(&sq_norms);
        let mut avg_log_lik = log_lik.mean().unwrap_or(f64::NEG_INFINITY);

        for iter in 0..max_iter {
            let resp = post.sum_axis(Axis(1));

            let mut scales = self.scales.clone();
            for k in 0..self.num_scales() {
                if resp[k] > MIN_RESPONSIBILITY {
                    scales[k] = post.row(k).dot(&sq_norms) / (dim * resp[k]);
                }
            }

            if scales.iter().any(|&s| !(s > 0.0) || !s.is_finite()) {
                return Err(IsaError::numerical(format!(
                    "GSM component collapsed after {} iterations",
                    iter
                )));
            }

            let scale_change = (&scales - &self.scales)
                .iter()
                .fold(0.0, |m: f64, &d| m.max(d.abs()));

            self.scales = scales;
            self.weights = &resp / num_samples;

            let (new_post, log_lik) = self.e_step(&sq_norms);
            let new_avg = log_lik.mean().unwrap_or(f64::NEG_INFINITY);

            debug!(
                iteration = iter + 1,
                log_likelihood = new_avg,
                scale_change,
                "GSM EM iteration"
            );

            if (new_avg - avg_log_lik).abs() < tol && scale_change < tol {
                return Ok(true);
            }

            avg_log_lik = new_avg;
            post = new_post;
        }

        Ok(false)
    }

    /// Posterior probability of each component for every sample.
    ///
    /// # Returns
    /// * `num_scales × n` matrix whose columns sum to one
    pub fn posterior(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        check_data(data, self.dim)?;
        Ok(self.e_step(&Self::squared_norms(data)).0)
    }

    /// Draw one variance per sample from the posterior over components.
    ///
    /// Conditioned on the returned variances the samples are Gaussian, which
    /// is what a Gibbs sweep over ISA latent states needs.
    pub fn sample_posterior(
        &self,
        data: &Array2<f64>,
        rng: &mut dyn RngCore,
    ) -> Result<Array1<f64>> {
        let post = self.posterior(data)?;
        Ok(post
            .columns()
            .into_iter()
            .map(|column| self.scales[sample_categorical(column, rng)])
            .collect())
    }

    /// Gradient of the energy with respect to the data.
    ///
    /// For a sample `x` this is `Σₖ p(k | x) x / sₖ`.
    pub fn energy_gradient(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        let post = self.posterior(data)?;
        let precisions = self.scales.mapv(|s| 1.0 / s);
        let factor = post.t().dot(&precisions);
        Ok(data * &factor)
    }
}

impl Distribution for Gsm {
    fn dim(&self) -> usize {
        self.dim
    }

    fn log_likelihood(&self, data: &Array2<f64>) -> Result<Array1<f64>> {
        check_data(data, self.dim)?;
        Ok(logsumexp(&self.log_joint(&Self::squared_norms(data))))
    }

    fn energy(&self, data: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(-self.log_likelihood(data)?)
    }

    fn sample(&self, num_samples: usize, rng: &mut dyn RngCore) -> Result<Array2<f64>> {
        let mut samples = sample_normal(self.dim, num_samples, rng);
        for mut column in samples.columns_mut() {
            let k = sample_categorical(self.weights.view(), rng);
            column *= self.scales[k].sqrt();
        }
        Ok(samples)
    }
}
