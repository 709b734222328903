// src/config.rs

//! Training and sampling parameters for ISA.

use crate::error::{IsaError, Result};
use serde::{Deserialize, Serialize};

/// Method used to optimize the basis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingMethod {
    /// Stochastic gradient descent with momentum.
    #[default]
    #[serde(rename = "SGD")]
    Sgd,
}

/// Method used to infer latent states of overcomplete models.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingMethod {
    /// Blocked Gibbs sampling over scales and latent states.
    #[default]
    Gibbs,
}

/// Options for the stochastic gradient descent phase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SgdParameters {
    /// Number of epochs per call to `train_sgd`.
    pub max_iter: usize,
    /// Number of data points per gradient step.
    pub batch_size: usize,
    /// Learning rate.
    pub step_width: f64,
    /// Momentum coefficient in `[0, 1)`.
    pub momentum: f64,
    /// Permute the data before each epoch.
    pub shuffle: bool,
    /// Keep the best basis seen and restore it at the end.
    pub pocket: bool,
}

impl Default for SgdParameters {
    fn default() -> Self {
        Self {
            max_iter: 1,
            batch_size: 100,
            step_width: 0.001,
            momentum: 0.8,
            shuffle: true,
            pocket: true,
        }
    }
}

/// Options for refitting the subspace priors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GsmParameters {
    /// Maximum number of EM iterations.
    pub max_iter: usize,
    /// Convergence tolerance on the average log-likelihood.
    pub tol: f64,
}

impl Default for GsmParameters {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol: 1e-8,
        }
    }
}

/// Options for Gibbs sampling in overcomplete models.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GibbsParameters {
    /// Number of full sweeps over scales and latent states.
    pub num_iter: usize,
}

impl Default for GibbsParameters {
    fn default() -> Self {
        Self { num_iter: 10 }
    }
}

/// Configuration for ISA training.
///
/// A fresh record is built per call; the trainer never mutates it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    /// Basis optimization method.
    pub training_method: TrainingMethod,

    /// Posterior inference method for overcomplete models.
    pub sampling_method: SamplingMethod,

    /// Number of outer training rounds.
    pub max_iter: usize,

    /// Adapt the step width between epochs and rounds.
    pub adaptive: bool,

    /// Gradient descent options.
    #[serde(rename = "SGD")]
    pub sgd: SgdParameters,

    /// Prior refitting options.
    #[serde(rename = "GSM")]
    pub gsm: GsmParameters,

    /// Gibbs sampling options.
    pub gibbs: GibbsParameters,

    /// Random seed for reproducibility.
    pub random_state: Option<u64>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            training_method: TrainingMethod::default(),
            sampling_method: SamplingMethod::default(),
            max_iter: 10,
            adaptive: true,
            sgd: SgdParameters::default(),
            gsm: GsmParameters::default(),
            gibbs: GibbsParameters::default(),
            random_state: None,
        }
    }
}

impl Parameters {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for constructing a configuration.
    pub fn builder() -> ParametersBuilder {
        ParametersBuilder::new()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_iter == 0 {
            return Err(invalid_config("max_iter", "must be greater than 0"));
        }

        if self.sgd.batch_size == 0 {
            return Err(invalid_config("SGD.batch_size", "must be greater than 0"));
        }

        if !(self.sgd.step_width > 0.0) || !self.sgd.step_width.is_finite() {
            return Err(invalid_config("SGD.step_width", "must be positive and finite"));
        }

        if !(0.0..1.0).contains(&self.sgd.momentum) {
            return Err(invalid_config("SGD.momentum", "must lie in [0, 1)"));
        }

        if !(self.gsm.tol > 0.0) {
            return Err(invalid_config("GSM.tol", "must be positive"));
        }

        if self.gibbs.num_iter == 0 {
            return Err(invalid_config("gibbs.num_iter", "must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid_config(parameter: &str, message: &str) -> IsaError {
    IsaError::InvalidConfig {
        parameter: parameter.into(),
        message: message.into(),
    }
}

/// Builder for constructing `Parameters` with a fluent API.
#[derive(Default)]
pub struct ParametersBuilder {
    params: Parameters,
}

impl ParametersBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            params: Parameters::default(),
        }
    }

    /// Set the number of outer training rounds.
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.params.max_iter = max_iter;
        self
    }

    /// Enable or disable step width adaptation.
    pub fn adaptive(mut self, adaptive: bool) -> Self {
        self.params.adaptive = adaptive;
        self
    }

    /// Set the number of SGD epochs per round.
    pub fn sgd_max_iter(mut self, max_iter: usize) -> Self {
        self.params.sgd.max_iter = max_iter;
        self
    }

    /// Set the minibatch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.params.sgd.batch_size = batch_size;
        self
    }

    /// Set the learning rate.
    pub fn step_width(mut self, step_width: f64) -> Self {
        self.params.sgd.step_width = step_width;
        self
    }

    /// Set the momentum coefficient.
    pub fn momentum(mut self, momentum: f64) -> Self {
        self.params.sgd.momentum = momentum;
        self
    }

    /// Enable or disable shuffling between epochs.
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.params.sgd.shuffle = shuffle;
        self
    }

    /// Enable or disable pocketing of the best basis.
    pub fn pocket(mut self, pocket: bool) -> Self {
        self.params.sgd.pocket = pocket;
        self
    }

    /// Set the maximum number of EM iterations for prior refits.
    pub fn gsm_max_iter(mut self, max_iter: usize) -> Self {
        self.params.gsm.max_iter = max_iter;
        self
    }

    /// Set the convergence tolerance for prior refits.
    pub fn gsm_tol(mut self, tol: f64) -> Self {
        self.params.gsm.tol = tol;
        self
    }

    /// Set the number of Gibbs sweeps.
    pub fn gibbs_num_iter(mut self, num_iter: usize) -> Self {
        self.params.gibbs.num_iter = num_iter;
        self
    }

    /// Set the random seed.
    pub fn random_state(mut self, seed: u64) -> Self {
        self.params.random_state = Some(seed);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Parameters {
        self.params
    }

    /// Build and validate the configuration.
    pub fn build_validated(self) -> Result<Parameters> {
        self.params.validate()?;
        Ok(self.params)
    }
}
