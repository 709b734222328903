// src/sgd.rs

//! Stochastic gradient training of a square (complete or completed) basis.
//!
//! The objective is the average log-likelihood of the data under
//!
//! ```text
//! x = C s,   log p(x) = Σₖ log pₖ(sₖ) − log|det C|
//! ```
//!
//! and each minibatch takes a natural gradient step
//! `ΔC = C (G Sᵀ / B − I)`, where `G` is the prior energy gradient at the
//! batch states `S = C⁻¹ X`.

use crate::config::Parameters;
use crate::error::{IsaError, Result};
use crate::isa::Isa;
use crate::math::{sln_det, solve};

use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::RngCore;
use tracing::{debug, warn};

/// Result of one call to [`run`].
pub(crate) struct SgdOutcome {
    /// Optimized (or pocketed) square basis.
    pub basis: Array2<f64>,
    /// False if a numerical failure cut training short.
    pub completed: bool,
    /// Average log-likelihood of the data under `basis`.
    pub log_likelihood: f64,
}

/// Average log-likelihood of `data` under the square basis `basis`.
pub(crate) fn log_likelihood(isa: &Isa, data: &Array2<f64>, basis: &Array2<f64>) -> Result<f64> {
    let states = solve(basis, data)?;
    ensure_finite(&states, "latent states")?;

    let (_, log_det) = sln_det(basis)?;
    let prior = isa.prior_log_likelihood(&states)?;
    let value = prior.mean().unwrap_or(f64::NEG_INFINITY) - log_det;

    if value.is_nan() || value == f64::INFINITY {
        return Err(IsaError::numerical("log-likelihood is not a number"));
    }
    Ok(value)
}

fn ensure_finite(a: &Array2<f64>, what: &str) -> Result<()> {
    if a.iter().any(|v| !v.is_finite()) {
        return Err(IsaError::numerical(format!("non-finite values in {}", what)));
    }
    Ok(())
}

/// Optimize `basis` on `data` with minibatch gradient ascent and momentum.
pub(crate) fn run(
    isa: &Isa,
    data: &Array2<f64>,
    basis: &Array2<f64>,
    params: &Parameters,
    rng: &mut dyn RngCore,
) -> Result<SgdOutcome> {
    let sgd = &params.sgd;
    let num_samples = data.ncols();
    let batch_size = sgd.batch_size.min(num_samples);

    let mut basis = basis.clone();
    let mut velocity = Array2::<f64>::zeros(basis.raw_dim());
    let mut step_width = sgd.step_width;

    let mut current = log_likelihood(isa, data, &basis)?;
    let mut best_basis = basis.clone();
    let mut best = current;

    let mut order: Vec<usize> = (0..num_samples).collect();

    for epoch in 0..sgd.max_iter {
        if sgd.shuffle {
            order.shuffle(rng);
        }

        let result = run_epoch(
            isa,
            data,
            &order,
            batch_size,
            step_width,
            sgd.momentum,
            &mut basis,
            &mut velocity,
        )
        .and_then(|_| log_likelihood(isa, data, &basis));

        let value = match result {
            Ok(value) => value,
            Err(err) if err.is_numerical() => {
                if sgd.pocket {
                    warn!(
                        epoch = epoch + 1,
                        error = %err,
                        "SGD aborted, restoring pocketed basis"
                    );
                    return Ok(SgdOutcome {
                        basis: best_basis,
                        completed: false,
                        log_likelihood: best,
                    });
                }
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        if params.adaptive {
            if value > current {
                step_width *= 1.1;
            } else {
                step_width *= 0.5;
            }
        }

        debug!(
            epoch = epoch + 1,
            log_likelihood = value,
            step_width,
            "SGD epoch"
        );

        current = value;
        if value > best {
            best = value;
            best_basis.assign(&basis);
        }
    }

    if sgd.pocket {
        return Ok(SgdOutcome {
            basis: best_basis,
            completed: true,
            log_likelihood: best,
        });
    }

    Ok(SgdOutcome {
        basis,
        completed: true,
        log_likelihood: current,
    })
}

/// One pass over the data in minibatches. A failing step leaves `basis`
/// and `velocity` at their last good values.
#[allow(clippy::too_many_arguments)]
fn run_epoch(
    isa: &Isa,
    data: &Array2<f64>,
    order: &[usize],
    batch_size: usize,
    step_width: f64,
    momentum: f64,
    basis: &mut Array2<f64>,
    velocity: &mut Array2<f64>,
) -> Result<()> {
    let dim = basis.nrows();

    for batch in order.chunks(batch_size) {
        let x = data.select(Axis(1), batch);
        let states = solve(basis, &x)?;
        ensure_finite(&states, "latent states")?;

        let grad = isa.prior_energy_gradient(&states)?;
        let mut m = grad.dot(&states.t()) / batch.len() as f64;
        for i in 0..dim {
            m[[i, i]] -= 1.0;
        }

        let delta = basis.dot(&m);
        ensure_finite(&delta, "basis gradient")?;

        let new_velocity = &*velocity * momentum + &delta * step_width;
        let candidate = &*basis + &new_velocity;
        ensure_finite(&candidate, "basis")?;
        sln_det(&candidate)?;

        *velocity = new_velocity;
        *basis = candidate;
    }

    Ok(())
}
