// src/isa.rs

//! Independent Subspace Analysis.

use crate::config::{Parameters, SamplingMethod, TrainingMethod};
use crate::distribution::{check_data, Distribution};
use crate::error::{IsaError, Result};
use crate::gibbs;
use crate::gsm::Gsm;
use crate::math::{inverse, orthogonal_complement, sln_det, solve};
use crate::result::{TrainingOutcome, TrainingSummary};
use crate::sgd;
use crate::utils::{amari_distance, logmeanexp, sample_normal};

use ndarray::{concatenate, s, Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::f64::consts::PI;
use std::ops::Range;
use tracing::{debug, info, warn};

/// Number of importance samples used to estimate overcomplete likelihoods.
const NUM_IMPORTANCE_SAMPLES: usize = 100;

/// Seed of the generator behind the overcomplete likelihood estimate.
const IMPORTANCE_SEED: u64 = 0x15A;

/// Seed used to draw the extra basis vectors of overcomplete models.
const INIT_SEED: u64 = 42;

/// An ISA model: `x = A s` with the latent vector `s` split into independent
/// subspaces, each with a Gaussian scale mixture prior.
///
/// Data matrices hold one sample per column.
///
/// # Example
///
/// ```rust,no_run
/// use isa::{Distribution, Isa, Parameters};
/// use ndarray::Array2;
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
///
/// # fn main() -> Result<(), isa::IsaError> {
/// let mut rng = StdRng::seed_from_u64(0);
/// let mut model = Isa::new(4, None, 2, 10)?;
///
/// let data: Array2<f64> = model.sample(1000, &mut rng)?;
/// let params = Parameters::builder().max_iter(5).random_state(1).build();
/// let summary = model.train(&data, &params)?;
///
/// println!("{:?} bits/dim", summary.final_bits_per_dim());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Isa {
    num_visibles: usize,
    num_hiddens: usize,
    subspace_size: usize,
    basis: Array2<f64>,
    subspaces: Vec<Gsm>,
}

impl Isa {
    /// Create a model with `num_visibles` observed and `num_hiddens` latent
    /// dimensions (defaults to `num_visibles`).
    ///
    /// Latent dimensions are grouped into contiguous subspaces of
    /// `subspace_size`; the last one is smaller if the sizes do not divide.
    /// Each subspace gets a GSM prior with `num_scales` components.
    ///
    /// A complete model starts from the identity basis. An overcomplete one
    /// starts from the identity followed by random unit-length columns.
    pub fn new(
        num_visibles: usize,
        num_hiddens: Option<usize>,
        subspace_size: usize,
        num_scales: usize,
    ) -> Result<Self> {
        let num_hiddens = num_hiddens.unwrap_or(num_visibles);

        if num_visibles == 0 {
            return Err(IsaError::invalid("number of visible units must be positive"));
        }
        if num_hiddens < num_visibles {
            return Err(IsaError::invalid(format!(
                "number of hidden units ({}) must not be smaller than number of visible units ({})",
                num_hiddens, num_visibles
            )));
        }
        if subspace_size == 0 {
            return Err(IsaError::invalid("subspace size must be positive"));
        }

        let mut basis = Array2::zeros((num_visibles, num_hiddens));
        basis
            .slice_mut(s![.., ..num_visibles])
            .assign(&Array2::eye(num_visibles));

        if num_hiddens > num_visibles {
            let mut rng = StdRng::seed_from_u64(INIT_SEED);
            let mut extra = sample_normal(num_visibles, num_hiddens - num_visibles, &mut rng);
            for mut column in extra.columns_mut() {
                let norm = column.dot(&column).sqrt();
                column /= norm;
            }
            basis.slice_mut(s![.., num_visibles..]).assign(&extra);
        }

        let mut isa = Self {
            num_visibles,
            num_hiddens,
            subspace_size,
            basis,
            subspaces: Vec::new(),
        };

        isa.subspaces = isa
            .subspace_ranges()
            .map(|range| Gsm::new(range.len(), num_scales))
            .collect::<Result<Vec<_>>>()?;

        Ok(isa)
    }

    /// Parameters `train` uses when none are given explicitly.
    pub fn default_parameters() -> Parameters {
        Parameters::default()
    }

    /// Dimensionality of the data.
    pub fn num_visibles(&self) -> usize {
        self.num_visibles
    }

    /// Dimensionality of the latent space.
    pub fn num_hiddens(&self) -> usize {
        self.num_hiddens
    }

    /// Whether the basis is square.
    pub fn complete(&self) -> bool {
        self.num_visibles == self.num_hiddens
    }

    /// Nominal number of latent dimensions per subspace.
    pub fn subspace_size(&self) -> usize {
        self.subspace_size
    }

    pub fn num_subspaces(&self) -> usize {
        self.subspaces.len()
    }

    /// Priors of the subspaces, in latent-dimension order.
    pub fn subspaces(&self) -> &[Gsm] {
        &self.subspaces
    }

    /// Mutable access to the priors. Their dimensionality is fixed.
    pub fn subspaces_mut(&mut self) -> &mut [Gsm] {
        &mut self.subspaces
    }

    pub fn basis(&self) -> &Array2<f64> {
        &self.basis
    }

    /// Replace the basis. Its shape must be `num_visibles × num_hiddens`.
    pub fn set_basis(&mut self, basis: Array2<f64>) -> Result<()> {
        if basis.dim() != (self.num_visibles, self.num_hiddens) {
            return Err(IsaError::invalid(format!(
                "basis must be {}x{}, got {}x{}",
                self.num_visibles,
                self.num_hiddens,
                basis.nrows(),
                basis.ncols()
            )));
        }
        if basis.iter().any(|v| !v.is_finite()) {
            return Err(IsaError::invalid("basis must be finite"));
        }
        self.basis = basis;
        Ok(())
    }

    /// Amari distance between this model's unmixing matrix and a reference
    /// mixing matrix. Zero when the basis equals `mixing` up to permutation
    /// and scaling of its columns.
    pub fn amari_distance(&self, mixing: &Array2<f64>) -> Result<f64> {
        if !self.complete() {
            return Err(IsaError::invalid(
                "Amari distance requires a complete model",
            ));
        }
        if mixing.dim() != self.basis.dim() {
            return Err(IsaError::invalid(format!(
                "mixing matrix must be {}x{}, got {}x{}",
                self.num_visibles,
                self.num_hiddens,
                mixing.nrows(),
                mixing.ncols()
            )));
        }
        let unmixing = inverse(&self.basis).map_err(as_numerical)?;
        Ok(amari_distance(&unmixing, mixing))
    }

    /// Latent rows covered by each subspace.
    pub(crate) fn subspace_ranges(&self) -> impl Iterator<Item = Range<usize>> {
        let (size, total) = (self.subspace_size, self.num_hiddens);
        (0..total.div_ceil(size)).map(move |k| k * size..((k + 1) * size).min(total))
    }

    /// The basis squared up by an orthonormal basis of its null space.
    ///
    /// For complete models this is the basis itself. The result is derived
    /// on demand and never stored.
    pub fn completed_basis(&self) -> Result<Array2<f64>> {
        if self.complete() {
            return Ok(self.basis.clone());
        }
        let complement = orthogonal_complement(&self.basis)?;
        concatenate(Axis(0), &[self.basis.view(), complement.view()])
            .map_err(|e| IsaError::numerical(format!("cannot complete basis: {}", e)))
    }

    fn check_states(&self, states: &Array2<f64>) -> Result<()> {
        check_data(states, self.num_hiddens)
    }

    /// Sum of the subspace log-densities of every column of `states`.
    pub(crate) fn prior_log_likelihood(&self, states: &Array2<f64>) -> Result<Array1<f64>> {
        self.check_states(states)?;
        let mut log_lik = Array1::zeros(states.ncols());
        for (range, gsm) in self.subspace_ranges().zip(&self.subspaces) {
            log_lik += &gsm.log_likelihood(&states.slice(s![range, ..]).to_owned())?;
        }
        Ok(log_lik)
    }

    /// Gradient of the prior energy with respect to the latent states.
    pub fn prior_energy_gradient(&self, states: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_states(states)?;
        let mut grad = Array2::zeros(states.raw_dim());
        for (range, gsm) in self.subspace_ranges().zip(&self.subspaces) {
            let block = states.slice(s![range.clone(), ..]).to_owned();
            grad.slice_mut(s![range, ..])
                .assign(&gsm.energy_gradient(&block)?);
        }
        Ok(grad)
    }

    /// Draw latent states from the subspace priors.
    ///
    /// # Returns
    /// * `num_hiddens × num_samples` matrix
    pub fn sample_prior(&self, num_samples: usize, rng: &mut dyn RngCore) -> Result<Array2<f64>> {
        let blocks = self
            .subspaces
            .iter()
            .map(|gsm| gsm.sample(num_samples, rng))
            .collect::<Result<Vec<_>>>()?;
        let views: Vec<_> = blocks.iter().map(|b| b.view()).collect();
        concatenate(Axis(0), &views)
            .map_err(|e| IsaError::numerical(format!("cannot stack subspace samples: {}", e)))
    }

    /// Infer latent states for `data` using the default parameters.
    pub fn sample_posterior(
        &self,
        data: &Array2<f64>,
        rng: &mut dyn RngCore,
    ) -> Result<Array2<f64>> {
        self.sample_posterior_with(data, &Self::default_parameters(), rng)
    }

    /// Infer latent states for `data`.
    ///
    /// Complete models invert the basis, which is deterministic. Overcomplete
    /// models run `params.gibbs.num_iter` Gibbs sweeps and return the last
    /// draw.
    pub fn sample_posterior_with(
        &self,
        data: &Array2<f64>,
        params: &Parameters,
        rng: &mut dyn RngCore,
    ) -> Result<Array2<f64>> {
        check_data(data, self.num_visibles)?;

        if self.complete() {
            return solve(&self.basis, data).map_err(as_numerical);
        }

        match params.sampling_method {
            SamplingMethod::Gibbs => {
                gibbs::sample_posterior(self, data, params.gibbs.num_iter, rng)
                    .map_err(as_numerical)
            }
        }
    }

    /// Fit the basis and the subspace priors to `data`.
    ///
    /// Each round infers latent states, refits the priors on them and runs
    /// SGD on the (completed) basis. The basis is updated in place; a round
    /// whose SGD run failed numerically keeps the pocketed basis when
    /// `params.sgd.pocket` is set and aborts with an error otherwise.
    pub fn train(&mut self, data: &Array2<f64>, params: &Parameters) -> Result<TrainingSummary> {
        params.validate()?;
        check_data(data, self.num_visibles)?;

        match params.training_method {
            TrainingMethod::Sgd => {}
        }

        let mut rng = match params.random_state {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        // adaptive training adjusts the step width of this copy only
        let mut round_params = params.clone();

        let mut bits_per_dim = Vec::with_capacity(params.max_iter);
        let mut outcome = TrainingOutcome::MaxIterReached;
        let mut n_restored = 0;
        let mut n_iter = 0;

        for iter in 0..params.max_iter {
            n_iter = iter + 1;

            let states = self.sample_posterior_with(data, &round_params, &mut rng)?;
            self.train_prior(&states, &round_params)?;

            let compl_basis = self.completed_basis()?;
            let compl_data = if self.complete() {
                data.clone()
            } else {
                let hidden = compl_basis
                    .slice(s![self.num_visibles.., ..])
                    .dot(&states);
                concatenate(Axis(0), &[data.view(), hidden.view()])
                    .map_err(|e| IsaError::numerical(format!("cannot complete data: {}", e)))?
            };

            let completed = self.train_sgd(&compl_data, &compl_basis, &round_params, &mut rng)?;
            if !completed {
                n_restored += 1;
                if params.adaptive {
                    round_params.sgd.step_width *= 0.5;
                    warn!(
                        iteration = n_iter,
                        step_width = round_params.sgd.step_width,
                        "reducing step width after numerical failure"
                    );
                }
            }

            let bits = self.evaluate(data)?;
            info!(iteration = n_iter, bits_per_dim = bits, "ISA training round");

            let converged = bits_per_dim
                .last()
                .is_some_and(|&last: &f64| (last - bits).abs() < params.gsm.tol);
            bits_per_dim.push(bits);

            if converged {
                outcome = TrainingOutcome::Converged;
                break;
            }
        }

        Ok(TrainingSummary {
            n_iterations: n_iter,
            outcome,
            bits_per_dim,
            n_restored,
            step_width: round_params.sgd.step_width,
        })
    }

    /// Refit every subspace prior on its rows of `states`.
    pub fn train_prior(&mut self, states: &Array2<f64>, params: &Parameters) -> Result<()> {
        self.check_states(states)?;
        let ranges: Vec<_> = self.subspace_ranges().collect();
        for (range, gsm) in ranges.into_iter().zip(self.subspaces.iter_mut()) {
            let block = states.slice(s![range, ..]).to_owned();
            gsm.train(&block, params.gsm.max_iter, params.gsm.tol)?;
        }
        Ok(())
    }

    /// Optimize the completed basis `compl_basis` on completed data
    /// `compl_data` by SGD, then keep its first `num_visibles` rows as the
    /// new basis.
    ///
    /// # Returns
    /// * `true` if all epochs ran, `false` if a numerical failure ended
    ///   training early and the pocketed basis was restored
    pub fn train_sgd(
        &mut self,
        compl_data: &Array2<f64>,
        compl_basis: &Array2<f64>,
        params: &Parameters,
        rng: &mut dyn RngCore,
    ) -> Result<bool> {
        params.validate()?;
        check_data(compl_data, self.num_hiddens)?;
        if compl_basis.dim() != (self.num_hiddens, self.num_hiddens) {
            return Err(IsaError::invalid(format!(
                "completed basis must be {}x{}, got {}x{}",
                self.num_hiddens,
                self.num_hiddens,
                compl_basis.nrows(),
                compl_basis.ncols()
            )));
        }

        let outcome = sgd::run(self, compl_data, compl_basis, params, rng).map_err(as_numerical)?;
        debug!(
            log_likelihood = outcome.log_likelihood,
            completed = outcome.completed,
            "SGD finished"
        );
        self.basis = outcome
            .basis
            .slice(s![..self.num_visibles, ..])
            .to_owned();
        Ok(outcome.completed)
    }

    /// Importance-sampling estimate of the log-likelihood for overcomplete
    /// models.
    ///
    /// The hidden coordinates `y = B s` of the completed basis `C = [A; B]`
    /// are integrated out with the Gaussian proposal `N(0, B D Bᵀ)`, where
    /// `D` holds the widest scale of each subspace.
    fn overcomplete_log_likelihood(&self, data: &Array2<f64>) -> Result<Array1<f64>> {
        let compl_basis = self.completed_basis()?;
        let (_, log_det) = sln_det(&compl_basis)?;
        let unmixing = inverse(&compl_basis)?;
        let complement = compl_basis.slice(s![self.num_visibles.., ..]).to_owned();

        let num_extra = self.num_hiddens - self.num_visibles;
        let num_samples = data.ncols();

        let mut widest = Array1::zeros(self.num_hiddens);
        for (range, gsm) in self.subspace_ranges().zip(&self.subspaces) {
            let s_max = gsm.scales().iter().cloned().fold(0.0, f64::max);
            widest.slice_mut(s![range]).fill(s_max);
        }

        let proposal_cov = (&complement * &widest).dot(&complement.t());
        let (_, proposal_log_det) = sln_det(&proposal_cov)?;
        let proposal_norm = 0.5 * (num_extra as f64 * (2.0 * PI).ln() + proposal_log_det);

        let std = widest.mapv(f64::sqrt).insert_axis(Axis(1));
        let mut rng = StdRng::seed_from_u64(IMPORTANCE_SEED);
        let mut log_weights = Array2::zeros((NUM_IMPORTANCE_SAMPLES, num_samples));

        for mut row in log_weights.rows_mut() {
            let latent = sample_normal(self.num_hiddens, num_samples, &mut rng) * &std;
            let hidden = complement.dot(&latent);

            let whitened = solve(&proposal_cov, &hidden)?;
            let log_q = (&hidden * &whitened).sum_axis(Axis(0)) * -0.5 - proposal_norm;

            let full = concatenate(Axis(0), &[data.view(), hidden.view()])
                .map_err(|e| IsaError::numerical(format!("cannot complete data: {}", e)))?;
            let states = unmixing.dot(&full);

            let log_p = self.prior_log_likelihood(&states)? - log_det;
            row.assign(&(log_p - log_q));
        }

        Ok(logmeanexp(&log_weights))
    }
}

fn as_numerical(err: IsaError) -> IsaError {
    match err {
        IsaError::SingularMatrix => IsaError::numerical("basis is singular"),
        other => other,
    }
}

impl Distribution for Isa {
    fn dim(&self) -> usize {
        self.num_visibles
    }

    /// Exact for complete models. Overcomplete models use a deterministic
    /// importance-sampling estimate.
    fn log_likelihood(&self, data: &Array2<f64>) -> Result<Array1<f64>> {
        check_data(data, self.num_visibles)?;

        if !self.complete() {
            return self.overcomplete_log_likelihood(data).map_err(as_numerical);
        }

        let states = solve(&self.basis, data).map_err(as_numerical)?;
        let (_, log_det) = sln_det(&self.basis).map_err(as_numerical)?;
        Ok(self.prior_log_likelihood(&states)? - log_det)
    }

    fn energy(&self, data: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(-self.log_likelihood(data)?)
    }

    fn sample(&self, num_samples: usize, rng: &mut dyn RngCore) -> Result<Array2<f64>> {
        Ok(self.basis.dot(&self.sample_prior(num_samples, rng)?))
    }
}
