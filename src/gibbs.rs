// src/gibbs.rs

//! Gibbs sampling of latent states in overcomplete models.
//!
//! Each GSM prior is a Gaussian once its scale variable is fixed. A sweep
//! therefore alternates between
//!
//! 1. drawing every subspace's scale from its posterior given the current
//!    states, and
//! 2. drawing the states exactly from the Gaussian prior `N(0, D)` restricted
//!    to the affine set `{s : A s = x}`:
//!
//! ```text
//! z ~ N(0, D),   s = z + D Aᵀ (A D Aᵀ)⁻¹ (x − A z)
//! ```

use crate::error::Result;
use crate::isa::Isa;
use crate::math::solve;
use crate::utils::sample_normal;

use ndarray::{s, Array2, Axis};
use rand::RngCore;
use tracing::debug;

/// Least-norm latent states reproducing `data`: `Aᵀ (A Aᵀ)⁻¹ X`.
pub(crate) fn least_norm_states(basis: &Array2<f64>, data: &Array2<f64>) -> Result<Array2<f64>> {
    let gram = basis.dot(&basis.t());
    Ok(basis.t().dot(&solve(&gram, data)?))
}

/// Run `num_iter` sweeps and return the final draw of the latent states.
pub(crate) fn sample_posterior(
    isa: &Isa,
    data: &Array2<f64>,
    num_iter: usize,
    rng: &mut dyn RngCore,
) -> Result<Array2<f64>> {
    let basis = isa.basis();
    let mut states = least_norm_states(basis, data)?;

    for sweep in 0..num_iter {
        let variances = sample_variances(isa, &states, rng)?;
        states = sample_states(basis, &variances, data, rng)?;
        debug!(sweep = sweep + 1, "Gibbs sweep");
    }

    Ok(states)
}

/// Per latent dimension and sample, the variance drawn for its subspace.
fn sample_variances(
    isa: &Isa,
    states: &Array2<f64>,
    rng: &mut dyn RngCore,
) -> Result<Array2<f64>> {
    let mut variances = Array2::zeros(states.raw_dim());

    for (range, gsm) in isa.subspace_ranges().zip(isa.subspaces()) {
        let block = states.slice(s![range.clone(), ..]).to_owned();
        let drawn = gsm.sample_posterior(&block, rng)?;
        for mut row in variances.slice_mut(s![range, ..]).rows_mut() {
            row.assign(&drawn);
        }
    }

    Ok(variances)
}

/// Draw states from `N(0, diag(variances[:, n]))` conditioned on `A s = x`.
fn sample_states(
    basis: &Array2<f64>,
    variances: &Array2<f64>,
    data: &Array2<f64>,
    rng: &mut dyn RngCore,
) -> Result<Array2<f64>> {
    let (num_hiddens, num_samples) = variances.dim();
    let mut states = sample_normal(num_hiddens, num_samples, rng) * variances.mapv(f64::sqrt);
    let residuals = data - &basis.dot(&states);

    for (n, mut column) in states.axis_iter_mut(Axis(1)).enumerate() {
        let d = variances.column(n);
        // A D, then A D Aᵀ
        let scaled = basis * &d;
        let cov = scaled.dot(&basis.t());

        let r = residuals.column(n).insert_axis(Axis(1)).to_owned();
        let u = solve(&cov, &r)?;
        let correction = scaled.t().dot(&u);

        column += &correction.column(0);
    }

    Ok(states)
}
